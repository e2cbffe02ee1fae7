/// Failure to obtain a route from a directions backend.
///
/// Carried as the payload of the reroute-failed event, so it is cheap to
/// clone and renders a readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("no route found between the requested waypoints")]
    NoRoute,
    #[error("invalid route request: {0}")]
    InvalidRequest(String),
    #[error("directions request failed: {0}")]
    Request(String),
    #[error("invalid directions response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_detail() {
        assert_eq!(
            RoutingError::Request("timeout".into()).to_string(),
            "directions request failed: timeout"
        );
        assert_eq!(
            RoutingError::NoRoute.to_string(),
            "no route found between the requested waypoints"
        );
    }

    #[test]
    fn converts_into_anyhow() {
        let err: anyhow::Error = RoutingError::InvalidResponse("empty body".into()).into();
        assert!(err.to_string().contains("empty body"));
        assert!(err.downcast_ref::<RoutingError>().is_some());
    }
}
