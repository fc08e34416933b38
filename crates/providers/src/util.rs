use cb_domain::Error;

/// Map a reqwest error onto the shared error type.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    Error::Http(e.to_string())
}
