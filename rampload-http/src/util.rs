pub(super) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

pub(super) fn check_scheme(url: &str) -> Result<(), super::Error> {
    let parsed = url::Url::parse(url).map_err(|_| super::Error::InvalidUrl(url.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(super::Error::UnsupportedScheme(url.to_string())),
    }
}
