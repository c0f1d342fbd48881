pub const DEFAULT_USER_AGENT: &str = "centralino-updater";

pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("http://localhost:8000/", "/update/progress"),
            "http://localhost:8000/update/progress"
        );
        assert_eq!(
            join_url("http://localhost:8000", "health"),
            "http://localhost:8000/health"
        );
    }
}
