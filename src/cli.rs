use crate::dataset::DEFAULT_ROOT;
use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::PathBuf;

pub const HELP: &str = "\
AnimeFace CNN

Trains and/or serves a convolutional classifier of anime character faces.
Configurations and the trained model are persisted in an artifacts directory.

USAGE:
    animeface [OPTIONS]

When neither --training nor --inference is given, inference runs.

BEHAVIOR OVERVIEW
- The dataset directory holds one sub-directory per character; sorted directory names give the class ids.
- If --training-config or --model-config is given, that config is loaded from the file and saved to the artifacts directory.
- Otherwise configs are loaded from the artifacts directory, or created with defaults and saved there.
- Training resumes from a model found in the artifacts directory, unless --remove-artifacts is set.
- After training, the model is written to the artifacts directory (cnn_model.mpk).
- Inference reads one image path per line from stdin and prints the 9 most probable characters, until end of input.
- If both --training and --inference are specified, training executes first, followed by inference using the trained model.

FLAGS:
    -h, --help                  Show this help message and exit

OPTIONS:
    -g, --gpu <ID>              GPU id (negative value indicates CPU) [default: -1]
    -t, --training              Train the model and save it
    -i, --inference             Classify images read from stdin
    -r, --remove-artifacts      Delete an existing model before training instead of resuming from it
                                (has no effect if --training is not used)
    -d, --dataset <PATH>        Dataset directory [default: ./animeface-character-dataset/thumb]
    -c, --training-config <PATH>
                                Load training configuration from this file (overrides any config in artifacts directory)
    -m, --model-config <PATH>   Load model configuration from this file (overrides any config in artifacts directory)
    -a, --artifacts-path <PATH>
                                Directory where configurations and model weights are saved and loaded.
                                If the directory does not exist, it will be created. [default: .]
";

#[derive(Debug, Clone, PartialEq)]
pub struct AppArgs {
    pub gpu: i32,
    pub training: bool,
    pub inference: bool,
    pub remove_artifacts: bool,
    pub dataset_path: PathBuf,
    pub training_config: Option<PathBuf>,
    pub model_config: Option<PathBuf>,
    pub artifacts_path: PathBuf,
}

impl AppArgs {
    pub fn parse() -> Result<Self> {
        let mut pargs = pico_args::Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            println!("{}", HELP);
            std::process::exit(0);
        }

        Self::from_pargs(pargs)
    }

    pub fn from_vec(args: Vec<OsString>) -> Result<Self> {
        Self::from_pargs(pico_args::Arguments::from_vec(args))
    }

    fn from_pargs(mut pargs: pico_args::Arguments) -> Result<Self> {
        let mut args = AppArgs {
            gpu: pargs.opt_value_from_str(["-g", "--gpu"])?.unwrap_or(-1),
            dataset_path: pargs
                .opt_value_from_os_str(["-d", "--dataset"], parse_path)?
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT)),
            training_config: pargs
                .opt_value_from_os_str(["-c", "--training-config"], parse_path)?,
            model_config: pargs.opt_value_from_os_str(["-m", "--model-config"], parse_path)?,
            artifacts_path: pargs
                .opt_value_from_os_str(["-a", "--artifacts-path"], parse_path)?
                .unwrap_or_else(|| PathBuf::from(".")),
            // must parse flags after values
            training: pargs.contains(["-t", "--training"]),
            inference: pargs.contains(["-i", "--inference"]),
            remove_artifacts: pargs.contains(["-r", "--remove-artifacts"]),
        };
        if !args.training && !args.inference {
            args.inference = true;
        }

        let remaining = pargs.finish();
        if !remaining.is_empty() {
            return Err(Error::UnusedArguments(remaining));
        }

        Ok(args)
    }
}

fn parse_path(s: &std::ffi::OsStr) -> std::result::Result<PathBuf, &'static str> {
    Ok(s.into())
}
