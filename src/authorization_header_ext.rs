pub trait AuthorizationHeaderExt {
    /// The credential part of an `Authorization` header value, i.e. the second
    /// whitespace-separated segment of `Bearer <token>`.
    fn bearer_token(&self) -> Option<&str>;
}

impl AuthorizationHeaderExt for str {
    fn bearer_token(&self) -> Option<&str> {
        self.split_whitespace().nth(1)
    }
}

impl AuthorizationHeaderExt for String {
    fn bearer_token(&self) -> Option<&str> {
        self.as_str().bearer_token()
    }
}
