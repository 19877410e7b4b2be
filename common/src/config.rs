//! Configuration types for runtime, output and cluster access settings

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

impl OutputConfig {
    /// Log level matching the verbosity counter
    #[must_use]
    pub fn level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::ERROR,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

/// Settings used to reach the cluster through `kubectl`.
///
/// Built once by [`ClusterConfig::load`] and passed by value into the session factory;
/// nothing below the driver reads the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// kubectl binary (name looked up in PATH, or a full path)
    pub kubectl: std::path::PathBuf,
    /// Resolved kubeconfig file, `None` lets kubectl apply its own defaults
    pub kubeconfig: Option<std::path::PathBuf>,
    /// kubeconfig context to use instead of the current one
    pub context: Option<String>,
    /// Passed to kubectl as `--request-timeout`
    pub request_timeout: Option<std::time::Duration>,
}

/// Inputs to [`ClusterConfig::load`] as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ClusterOptions {
    pub kubectl: Option<std::path::PathBuf>,
    pub kubeconfig: Option<std::path::PathBuf>,
    pub context: Option<String>,
    pub request_timeout: Option<std::time::Duration>,
}

/// Environment the kubeconfig lookup depends on.
///
/// Captured up front so that resolution itself is a pure function.
#[derive(Debug, Clone, Default)]
pub struct ConfigEnv {
    /// Value of `$KUBECONFIG`
    pub kubeconfig_var: Option<std::ffi::OsString>,
    /// User's home directory
    pub home: Option<std::path::PathBuf>,
}

impl ConfigEnv {
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            kubeconfig_var: std::env::var_os("KUBECONFIG").filter(|v| !v.is_empty()),
            home: dirs::home_dir(),
        }
    }
}

impl ClusterConfig {
    /// Resolve cluster access settings.
    ///
    /// The kubeconfig is taken from, in order: the explicit option, `$KUBECONFIG`,
    /// `~/.kube/config` if that file exists. When none applies kubectl is left to
    /// its own defaults (e.g. in-cluster service account credentials).
    #[must_use]
    pub fn load(options: ClusterOptions, env: &ConfigEnv) -> Self {
        let kubeconfig = options
            .kubeconfig
            .or_else(|| env.kubeconfig_var.as_ref().map(std::path::PathBuf::from))
            .or_else(|| {
                env.home
                    .as_ref()
                    .map(|home| home.join(".kube").join("config"))
                    .filter(|path| path.is_file())
            });
        tracing::debug!("using kubeconfig: {:?}", kubeconfig);
        Self {
            kubectl: options
                .kubectl
                .unwrap_or_else(|| std::path::PathBuf::from("kubectl")),
            kubeconfig,
            context: options.context,
            request_timeout: options.request_timeout,
        }
    }

    /// Global kubectl flags derived from this configuration
    #[must_use]
    pub fn kubectl_args(&self) -> Vec<std::ffi::OsString> {
        let mut args = Vec::new();
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push("--kubeconfig".into());
            args.push(kubeconfig.clone().into_os_string());
        }
        if let Some(context) = &self.context {
            args.push("--context".into());
            args.push(context.into());
        }
        if let Some(timeout) = self.request_timeout {
            args.push(format!("--request-timeout={}ms", timeout.as_millis().max(1)).into());
        }
        args
    }
}

/// Archive commands used on both ends of a copy.
///
/// The relay never looks inside the archive, only these commands do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveCommands {
    /// Archiver program available in both containers
    pub program: String,
}

impl Default for ArchiveCommands {
    fn default() -> Self {
        Self {
            program: "tar".to_string(),
        }
    }
}

impl ArchiveCommands {
    /// Command writing an archive of `path` to stdout
    #[must_use]
    pub fn pack(&self, path: &str) -> Vec<String> {
        vec![
            self.program.clone(),
            "cf".to_string(),
            "-".to_string(),
            path.to_string(),
        ]
    }

    /// Command reading an archive from stdin and extracting it under `dir`
    #[must_use]
    pub fn unpack(&self, dir: &str) -> Vec<String> {
        vec![
            self.program.clone(),
            "xf".to_string(),
            "-".to_string(),
            "-C".to_string(),
            dir.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_kubeconfig_wins() {
        let env = ConfigEnv {
            kubeconfig_var: Some("/from/env".into()),
            home: Some("/home/someone".into()),
        };
        let config = ClusterConfig::load(
            ClusterOptions {
                kubeconfig: Some("/explicit".into()),
                ..Default::default()
            },
            &env,
        );
        assert_eq!(config.kubeconfig, Some("/explicit".into()));
        assert_eq!(config.kubectl, std::path::PathBuf::from("kubectl"));
    }

    #[test]
    fn env_var_used_before_home() {
        let env = ConfigEnv {
            kubeconfig_var: Some("/from/env".into()),
            home: Some("/home/someone".into()),
        };
        let config = ClusterConfig::load(ClusterOptions::default(), &env);
        assert_eq!(config.kubeconfig, Some("/from/env".into()));
    }

    #[test]
    fn home_default_only_when_present() -> anyhow::Result<()> {
        let home = tempfile::tempdir()?;
        let env = ConfigEnv {
            kubeconfig_var: None,
            home: Some(home.path().to_path_buf()),
        };
        assert_eq!(
            ClusterConfig::load(ClusterOptions::default(), &env).kubeconfig,
            None
        );
        std::fs::create_dir(home.path().join(".kube"))?;
        std::fs::write(home.path().join(".kube").join("config"), "apiVersion: v1\n")?;
        assert_eq!(
            ClusterConfig::load(ClusterOptions::default(), &env).kubeconfig,
            Some(home.path().join(".kube").join("config"))
        );
        Ok(())
    }

    #[test]
    fn kubectl_args_include_all_global_flags() {
        let config = ClusterConfig {
            kubectl: "kubectl".into(),
            kubeconfig: Some("/k".into()),
            context: Some("staging".into()),
            request_timeout: Some(std::time::Duration::from_secs(30)),
        };
        let args: Vec<String> = config
            .kubectl_args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "--kubeconfig",
                "/k",
                "--context",
                "staging",
                "--request-timeout=30000ms"
            ]
        );
    }

    #[test]
    fn request_timeout_keeps_sub_second_precision() {
        let config = |timeout| ClusterConfig {
            kubectl: "kubectl".into(),
            kubeconfig: None,
            context: None,
            request_timeout: Some(timeout),
        };
        assert_eq!(
            config(std::time::Duration::from_millis(1500)).kubectl_args(),
            vec![std::ffi::OsString::from("--request-timeout=1500ms")]
        );
        // zero would mean "no timeout" to kubectl
        assert_eq!(
            config(std::time::Duration::from_micros(10)).kubectl_args(),
            vec![std::ffi::OsString::from("--request-timeout=1ms")]
        );
    }

    #[test]
    fn archive_commands() {
        let commands = ArchiveCommands::default();
        assert_eq!(commands.pack("/data"), vec!["tar", "cf", "-", "/data"]);
        assert_eq!(
            commands.unpack("/restore"),
            vec!["tar", "xf", "-", "-C", "/restore"]
        );
    }
}
