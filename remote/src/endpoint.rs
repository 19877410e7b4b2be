/// One side of a copy: a path inside a container of a pod.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub namespace: String,
    pub pod: String,
    /// `None` (or empty) selects the pod's default container
    pub container: Option<String>,
    /// Path to read on the source side, directory to extract into on the destination side
    pub path: String,
}

impl Endpoint {
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: Option<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.filter(|c| !c.is_empty()),
            path: path.into(),
        }
    }

    /// Explicitly requested container, if any
    #[must_use]
    pub fn container(&self) -> Option<&str> {
        self.container.as_deref().filter(|c| !c.is_empty())
    }

    /// `namespace/pod[/container]`, used in logs and error messages
    #[must_use]
    pub fn target(&self) -> String {
        match self.container() {
            Some(container) => format!("{}/{}/{}", self.namespace, self.pod, container),
            None => format!("{}/{}", self.namespace, self.pod),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.target(), self.path)
    }
}
