use crate::http::request::HttpRequest;

/// Whether the request carries `Authorization: Bearer <api_key>`.
/// An empty key leaves the endpoint open.
pub fn authorized(request: &HttpRequest, api_key: &str) -> bool {
    if api_key.is_empty() {
        return true;
    }
    request
        .header("authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == api_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn test_bearer_check() {
        let request = HttpRequest::new(Method::GET, "/admin/modules");
        assert!(authorized(&request, ""));
        assert!(!authorized(&request, "secret"));

        let request = request.with_header("authorization", "Bearer secret");
        assert!(authorized(&request, "secret"));
        assert!(!authorized(&request, "other"));
    }
}
