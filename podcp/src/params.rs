//! Copy parameters as supplied on the command line, and their validation

use remote::Endpoint;

/// Invalid or incomplete copy parameters. Always reported before any session is
/// established.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required parameter(s): {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("--namespace must not be empty")]
    EmptyNamespace,

    #[error("--buffer-size must be greater than zero")]
    ZeroBufferSize,
}

/// Raw copy parameters. Optional fields may be absent or empty until validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyParams {
    pub namespace: String,
    pub src_pod: Option<String>,
    pub src_container: Option<String>,
    pub src_path: Option<String>,
    pub dst_pod: Option<String>,
    pub dst_container: Option<String>,
    pub dst_dir: String,
}

impl Default for CopyParams {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            src_pod: None,
            src_container: None,
            src_path: None,
            dst_pod: None,
            dst_container: None,
            dst_dir: "/".to_string(),
        }
    }
}

/// Validated pair of endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub source: Endpoint,
    pub destination: Endpoint,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl CopyParams {
    /// Check that everything needed for a copy is present.
    ///
    /// All missing required parameters are reported together. An empty destination
    /// directory falls back to `/`.
    pub fn validate(self) -> Result<CopyRequest, ConfigError> {
        let src_pod = present(self.src_pod);
        let src_path = present(self.src_path);
        let dst_pod = present(self.dst_pod);
        let mut missing = vec![];
        if src_pod.is_none() {
            missing.push("--src-pod");
        }
        if src_path.is_none() {
            missing.push("--src-path");
        }
        if dst_pod.is_none() {
            missing.push("--dst-pod");
        }
        let (Some(src_pod), Some(src_path), Some(dst_pod)) = (src_pod, src_path, dst_pod) else {
            return Err(ConfigError::Missing(missing));
        };
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        let dst_dir = if self.dst_dir.is_empty() {
            "/".to_string()
        } else {
            self.dst_dir
        };
        Ok(CopyRequest {
            source: Endpoint::new(&self.namespace, src_pod, self.src_container, src_path),
            destination: Endpoint::new(self.namespace, dst_pod, self.dst_container, dst_dir),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> CopyParams {
        CopyParams {
            src_pod: Some("pod-a".to_string()),
            src_path: Some("/data/report.txt".to_string()),
            dst_pod: Some("pod-b".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_fill_namespace_and_destination_dir() {
        let request = complete().validate().unwrap();
        assert_eq!(request.source.namespace, "default");
        assert_eq!(request.source.path, "/data/report.txt");
        assert_eq!(request.destination.namespace, "default");
        assert_eq!(request.destination.path, "/");
        assert_eq!(request.destination.container(), None);
    }

    #[test]
    fn all_missing_parameters_are_reported_together() {
        let error = CopyParams::default().validate().unwrap_err();
        assert_eq!(
            error,
            ConfigError::Missing(vec!["--src-pod", "--src-path", "--dst-pod"])
        );
        assert_eq!(
            error.to_string(),
            "missing required parameter(s): --src-pod, --src-path, --dst-pod"
        );
    }

    #[test]
    fn blank_values_count_as_missing() {
        let params = CopyParams {
            dst_pod: Some("  ".to_string()),
            ..complete()
        };
        assert_eq!(
            params.validate().unwrap_err(),
            ConfigError::Missing(vec!["--dst-pod"])
        );
    }

    #[test]
    fn empty_namespace_is_rejected() {
        let params = CopyParams {
            namespace: String::new(),
            ..complete()
        };
        assert_eq!(params.validate().unwrap_err(), ConfigError::EmptyNamespace);
    }

    #[test]
    fn containers_are_carried_per_side() {
        let params = CopyParams {
            namespace: "prod".to_string(),
            src_container: Some("app".to_string()),
            dst_container: Some(String::new()),
            dst_dir: "/restore".to_string(),
            ..complete()
        };
        let request = params.validate().unwrap();
        assert_eq!(request.source.to_string(), "prod/pod-a/app:/data/report.txt");
        assert_eq!(request.destination.to_string(), "prod/pod-b:/restore");
    }
}
