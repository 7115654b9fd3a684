//! Redirect-following policy: where to go next, and whether the method
//! changes along the way.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    Get,
    Post,
    Put,
}

/// Decides the method and URL for the next request given a redirect
/// response. `303 See Other` always becomes a `GET`; a `301`/`302` POST is
/// also downgraded to `GET` (the long-standing browser behavior lftp's
/// HTTP backend mirrors); `307`/`308` always preserve the original method.
#[must_use]
pub fn next_request(status: u16, original_method: Method, location: &str) -> (Method, String) {
    let method = match status {
        303 => Method::Get,
        301 | 302 if original_method == Method::Post => Method::Get,
        _ => original_method,
    };
    (method, location.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn see_other_always_converts_to_get() {
        let (method, _) = next_request(303, Method::Put, "/new");
        assert_eq!(method, Method::Get);
    }

    #[test]
    fn permanent_redirect_preserves_post_body() {
        let (method, _) = next_request(308, Method::Post, "/new");
        assert_eq!(method, Method::Post);
    }

    #[test]
    fn found_downgrades_post_to_get() {
        let (method, _) = next_request(302, Method::Post, "/new");
        assert_eq!(method, Method::Get);
    }

    #[test]
    fn found_leaves_get_alone() {
        let (method, _) = next_request(302, Method::Get, "/new");
        assert_eq!(method, Method::Get);
    }
}
