use std::ffi::OsString;
use std::path::PathBuf;

// Version from Cargo.toml - automatically synchronized with releases
const DISPLAY_VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE_TEXT: &str = "Usage: llm-infer [OPTIONS] <MODEL_PATH (.gguf file or directory)> <MESSAGE>";

const HELP_TEXT: &str = "\
llm-infer - run a local GGUF model, falling back across model families\n\
\n\
Usage:\n\
    llm-infer [OPTIONS] <MODEL_PATH> <MESSAGE>\n\
\n\
Arguments:\n\
    MODEL_PATH        A .gguf file, or a directory (the largest .gguf inside is used).\n\
    MESSAGE           The prompt text, taken as-is even if it starts with '-'.\n\
\n\
Options:\n\
    -h, --help        Print this help text.\n\
    -v, --version     Show the version and this help output.\n\
    -d, --debug       Enable verbose logging to stderr.\n\
        --json        Print the result as a JSON object.\n\
        --            Treat every following argument as positional.\n\
\n\
Exit codes:\n\
    0  success, 1  usage error, 2  model resolution or inference failure\n\
\n\
Environment variables:\n\
    LLM_INFER_MAX_TOKENS            Maximum new tokens (default: 256).\n\
    LLM_INFER_TEMPERATURE           Sampling temperature (default: 0.7).\n\
    LLM_INFER_TOP_P                 Nucleus sampling cutoff (default: off).\n\
    LLM_INFER_SEED                  Sampling seed.\n\
    LLM_INFER_THREADS               Worker threads (default: half the CPUs, at least 2).\n\
    LLM_INFER_GPU_LAYERS            Accelerator layers (default: 0, CPU only).\n\
    LLM_INFER_DEVICE                Device when GPU layers > 0 (cpu, cuda or metal).\n\
    LLM_INFER_ATTEMPT_TIMEOUT_SECS  Give up on one model family after this many seconds.\n\
                                    The abandoned load keeps running, so two models may\n\
                                    be in memory while the next family loads.\n\
    LLM_INFER_SYSTEM_PROMPT         Replace the built-in system preamble.\n\
    RUST_LOG                        Override the log filter.\n\
";

/// Positional inputs of a generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub model_path: PathBuf,
    pub message: String,
}

#[derive(Debug)]
pub struct CliConfig {
    pub request: Option<Request>,
    pub show_help: bool,
    pub show_version: bool,
    pub debug: bool,
    pub json: bool,
}

impl CliConfig {
    pub fn from_env() -> Result<Self, String> {
        let args = std::env::args_os().skip(1);
        Self::from_args(args)
    }

    /// Parse arguments after the program name.
    ///
    /// The argument following the model path is always the message. Dash
    /// tokens that are not known flags count as positionals, so only the
    /// number of positionals decides whether the request is valid.
    pub fn from_args<I, T>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let mut show_help = false;
        let mut show_version = false;
        let mut debug = false;
        let mut json = false;
        let mut positionals: Vec<OsString> = Vec::new();

        let mut iter = args.into_iter().map(Into::into);

        while let Some(argument) = iter.next() {
            if positionals.len() == 1 {
                positionals.push(argument);
                continue;
            }

            match argument.to_str() {
                Some("--help" | "-h") => {
                    show_help = true;
                }
                Some("--version" | "-v") => {
                    show_version = true;
                    show_help = true;
                }
                Some("--debug" | "-d") => {
                    debug = true;
                }
                Some("--json") => {
                    json = true;
                }
                Some("--") => {
                    positionals.extend(iter.by_ref());
                    break;
                }
                _ => positionals.push(argument),
            }
        }

        let request = if show_help || show_version {
            None
        } else {
            Some(parse_request(positionals)?)
        };

        Ok(Self {
            request,
            show_help,
            show_version,
            debug,
            json,
        })
    }
}

fn parse_request(positionals: Vec<OsString>) -> Result<Request, String> {
    let [model_path, message]: [OsString; 2] =
        positionals.try_into().map_err(|rest: Vec<OsString>| {
            format!(
                "expected 2 arguments (model path and message), got {}",
                rest.len()
            )
        })?;

    Ok(Request {
        model_path: PathBuf::from(model_path),
        message: message.to_string_lossy().into_owned(),
    })
}

pub fn print_usage() {
    println!("{USAGE_TEXT}");
}

pub fn print_help() {
    println!("{HELP_TEXT}");
}

pub fn print_version() {
    println!("llm-infer {DISPLAY_VERSION}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parse_model_path_and_message() {
        let config = CliConfig::from_args(args(&["./models", "오늘 하루 어땠어?"])).expect("valid");

        assert_eq!(
            config.request,
            Some(Request {
                model_path: PathBuf::from("./models"),
                message: "오늘 하루 어땠어?".to_string(),
            })
        );
        assert!(!config.debug);
        assert!(!config.json);
    }

    #[test]
    fn flags_may_surround_positionals() {
        let config =
            CliConfig::from_args(args(&["-d", "model.gguf", "hello", "--json"])).expect("valid");

        assert!(config.debug);
        assert!(config.json);
        assert_eq!(config.request.unwrap().message, "hello");
    }

    #[test]
    fn double_dash_allows_dash_prefixed_message() {
        let config = CliConfig::from_args(args(&["--", "model.gguf", "-5 degrees today"]))
            .expect("valid");

        assert_eq!(config.request.unwrap().message, "-5 degrees today");
    }

    #[test]
    fn wrong_argument_count_is_rejected() {
        for values in [vec![], vec!["model.gguf"], vec!["a", "b", "c"]] {
            match CliConfig::from_args(args(&values)) {
                Err(msg) => assert!(msg.contains("expected 2 arguments")),
                Ok(_) => panic!("Expected error for {values:?}"),
            }
        }
    }

    #[test]
    fn dash_prefixed_message_needs_no_separator() {
        let config = CliConfig::from_args(args(&["model.gguf", "-tired today"])).expect("valid");
        assert_eq!(config.request.unwrap().message, "-tired today");

        let config = CliConfig::from_args(args(&["--json", "model.gguf", "-d"])).expect("valid");
        assert!(config.json);
        assert!(!config.debug);
        assert_eq!(config.request.unwrap().message, "-d");
    }

    #[test]
    fn blank_message_is_passed_through() {
        for message in ["", "   "] {
            let config = CliConfig::from_args(args(&["model.gguf", message])).expect("valid");
            assert_eq!(config.request.unwrap().message, message);
        }
    }

    #[test]
    fn unknown_option_counts_as_positional() {
        match CliConfig::from_args(args(&["--threads", "model.gguf", "hi"])) {
            Err(msg) => assert!(msg.contains("expected 2 arguments"), "{msg}"),
            Ok(_) => panic!("Expected error but got Ok"),
        }

        let config = CliConfig::from_args(args(&["--threads", "hi"])).expect("valid");
        assert_eq!(
            config.request.unwrap().model_path,
            PathBuf::from("--threads")
        );
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_model_path_is_preserved() {
        use std::os::unix::ffi::OsStrExt;

        let raw = std::ffi::OsStr::from_bytes(b"/models/llama-\xff.gguf");
        let config = CliConfig::from_args(vec![raw.to_os_string(), OsString::from("hi")])
            .expect("valid");

        assert_eq!(config.request.unwrap().model_path.as_os_str(), raw);
    }

    #[test]
    fn help_mentions_timeout_memory_cost() {
        assert!(HELP_TEXT.contains("two models may"));
    }

    #[test]
    fn help_skips_positional_validation() {
        let config = CliConfig::from_args(args(&["--help"])).expect("valid");
        assert!(config.show_help);
        assert!(config.request.is_none());

        let config = CliConfig::from_args(args(&["-v"])).expect("valid");
        assert!(config.show_version);
        assert!(config.show_help);
    }

    #[test]
    fn lone_dash_is_positional() {
        let config = CliConfig::from_args(args(&["-", "hi"])).expect("valid");
        assert_eq!(config.request.unwrap().model_path, PathBuf::from("-"));
    }
}
