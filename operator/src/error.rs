#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("invalid user input: {0}")]
    UserInput(String),

    #[error("json-patch error: {source}")]
    JsonPatch {
        #[from]
        source: json_patch::PatchError,
    },

    #[error("json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("timestamp out of range: {0}")]
    OutOfRange(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True iff this is a 404 from the API server. `NotFound` on a
    /// `remove`/`replace` patch is a recognized successful outcome, not a
    /// failure, since the target is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 404)
    }

    /// True iff this is a 409 Conflict, worth one retry after re-reading
    /// the object.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409)
    }
}
