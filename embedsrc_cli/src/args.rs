//! Command-line argument parser.
//!
//! Hand-rolled for zero-overhead startup. The grammar is tiny:
//!
//! ```text
//! embedsrc --help
//! embedsrc [--varname <name>] <language>
//! ```
//!
//! `--help` must appear alone, `--varname` at most once and with a value,
//! and exactly one positional (the language) is required.

use crate::framing::Language;

// =============================================================================
// Parsed Command
// =============================================================================

/// What the invocation asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the help text and exit.
    Help,
    /// Convert stdin into a source declaration.
    Embed {
        /// Variable name for the generated array.
        varname: String,
        /// Output language.
        language: Language,
    },
}

/// Default array variable name.
pub const DEFAULT_VARNAME: &str = "data";

// =============================================================================
// Parse Error
// =============================================================================

/// Error during argument parsing. All of these are user errors: the caller
/// reports them on stderr and exits *successfully*.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    /// No language given (or no arguments at all).
    NotEnoughArgs,
    /// Extra positional, or `--help` combined with anything else.
    TooManyArgs,
    /// A flag that needs a value reached the end of the argument list.
    MissingValue(&'static str),
    /// A single-occurrence flag appeared twice.
    DuplicateFlag(&'static str),
    /// Unrecognised flag.
    UnknownFlag(String),
    /// The positional is not a supported language.
    UnknownLanguage(String),
}

impl std::fmt::Display for ArgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgError::NotEnoughArgs => write!(f, "not enough args"),
            ArgError::TooManyArgs => write!(f, "too many args"),
            ArgError::MissingValue(flag) => {
                write!(f, "argument expected for the {} option", flag)
            }
            ArgError::DuplicateFlag(flag) => {
                write!(f, "the {} option may appear only once", flag)
            }
            ArgError::UnknownFlag(flag) => write!(f, "unknown option: {}", flag),
            ArgError::UnknownLanguage(_) => write!(f, "invalid language"),
        }
    }
}

impl std::error::Error for ArgError {}

// =============================================================================
// Parser Entry Point
// =============================================================================

/// Parse from a pre-collected argument vector.
///
/// The first element must be the first real argument, not the program name;
/// the caller is responsible for skipping `argv[0]`.
pub fn parse_args_vec(args: &[String]) -> Result<Command, ArgError> {
    if args.is_empty() {
        return Err(ArgError::NotEnoughArgs);
    }

    if args[0] == "--help" {
        if args.len() != 1 {
            return Err(ArgError::TooManyArgs);
        }
        return Ok(Command::Help);
    }

    let mut varname: Option<String> = None;
    let mut language: Option<Language> = None;
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];

        if arg == "--varname" {
            if varname.is_some() {
                return Err(ArgError::DuplicateFlag("--varname"));
            }
            i += 1;
            if i >= args.len() {
                return Err(ArgError::MissingValue("--varname"));
            }
            varname = Some(args[i].clone());
            i += 1;
            continue;
        }

        if arg.starts_with("--") {
            return Err(ArgError::UnknownFlag(arg.clone()));
        }

        // Positional: the language, exactly once.
        if language.is_some() {
            return Err(ArgError::TooManyArgs);
        }
        language = match Language::parse(arg) {
            Some(lang) => Some(lang),
            None => return Err(ArgError::UnknownLanguage(arg.clone())),
        };
        i += 1;
    }

    match language {
        Some(language) => Ok(Command::Embed {
            varname: varname.unwrap_or_else(|| DEFAULT_VARNAME.to_string()),
            language,
        }),
        None => Err(ArgError::NotEnoughArgs),
    }
}

// =============================================================================
// Help Text
// =============================================================================

/// Build the help text shown for `--help`.
pub fn help_text() -> String {
    format!(
        "usage: embedsrc [--help] | [--varname <name>] <language>\n\
         \n\
         Converts the byte stream on stdin into a source-code array\n\
         declaration on stdout.\n\
         \n\
         arguments:\n\
         \t--help             display this help text and exit\n\
         \t--varname <name>   variable name for the generated array (default: {})\n\
         \t<language>         output language for the declaration\n\
         \n\
         supported languages:\n\
         \tc++\n\
         \tc\n\
         \n\
         embedsrc {}\n",
        DEFAULT_VARNAME,
        embedsrc_core::VERSION,
    )
}

// =============================================================================
// Tests
// =============================================================================
