pub mod colors;
pub mod shutdown;

/// Annotation and label keys owned by the operator, namespaced under the
/// configured CRD API group (default `amalthea.dev`).
///
/// These are *suffixes*; callers prepend `"{api_group}/"` via
/// [`annotations::Keys`].
pub mod annotations {
    pub const LAST_ACTIVITY_DATE: &str = "last-activity-date";
    pub const HIBERNATION: &str = "hibernation";
    pub const HIBERNATION_DATE: &str = "hibernation-date";
    pub const PARENT_UID: &str = "parent-uid";
    pub const PARENT_NAME: &str = "parent-name";
    pub const CHILD_KEY: &str = "child-key";
    pub const MAIN_POD: &str = "main-pod";

    /// Resolves the annotation/label keys for a given API group, since the
    /// group is configurable at runtime rather than a compile-time constant.
    #[derive(Clone, Debug)]
    pub struct Keys {
        api_group: String,
    }

    impl Keys {
        pub fn new(api_group: impl Into<String>) -> Self {
            Self {
                api_group: api_group.into(),
            }
        }

        fn key(&self, suffix: &str) -> String {
            format!("{}/{}", self.api_group, suffix)
        }

        pub fn last_activity_date(&self) -> String {
            self.key(LAST_ACTIVITY_DATE)
        }

        pub fn hibernation(&self) -> String {
            self.key(HIBERNATION)
        }

        pub fn hibernation_date(&self) -> String {
            self.key(HIBERNATION_DATE)
        }

        pub fn parent_uid(&self) -> String {
            self.key(PARENT_UID)
        }

        pub fn parent_name(&self) -> String {
            self.key(PARENT_NAME)
        }

        pub fn child_key(&self) -> String {
            self.key(CHILD_KEY)
        }

        pub fn main_pod(&self) -> String {
            self.key(MAIN_POD)
        }
    }
}

pub fn signal_ready() {
    tracing::info!("operator ready");
}

/// Process-wide setup: disables color codes when `DISABLE_COLORS` is set,
/// and installs the `aws-lc-rs` crypto provider `rustls` needs before any
/// TLS connection (the kube client, the reqwest probe client) is built.
pub fn init() {
    let disable_colors = ["1", "true"].contains(
        &std::env::var("DISABLE_COLORS")
            .unwrap_or_default()
            .to_lowercase()
            .as_str(),
    );
    owo_colors::set_override(!disable_colors);
    install_rustls_provider();
}

pub fn install_rustls_provider() {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("install aws-lc-rs provider");
}
