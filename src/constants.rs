// EN: src/constants.rs

/// The name of the configuration file at the root of the asset directory.
pub const CONFIG_FILENAME: &str = "summon.config.yaml";

/// Where summoned files land when neither the config nor `--out` says otherwise.
pub const DEFAULT_OUTPUT_DIR: &str = ".summoned";

/// The executable name used in help screens when argv[0] is unavailable.
pub const DEFAULT_PROGRAM_NAME: &str = "summon";

/// Environment variable the stock binary reads the asset directory from.
pub const ASSETS_ENV_VAR: &str = "SUMMON_ASSETS";

/// Asset directory used when `SUMMON_ASSETS` is not set.
pub const DEFAULT_ASSETS_DIR: &str = "assets";

/// Name under which the shared `templates` source is registered.
pub const TEMPLATE_CONTEXT_NAME: &str = "summon";

/// Name of the grouping node holding every handle when it is not elided.
pub const RUN_COMMAND_NAME: &str = "run";

/// Hidden command used by shell completion scripts.
pub const COMPLETE_COMMAND_NAME: &str = "__complete";

/// Maximum nesting of `run` template calls before the chain is rejected.
pub const MAX_RUN_DEPTH: usize = 32;
