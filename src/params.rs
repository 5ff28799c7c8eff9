//! Parameter Parser.
//!
//! Manual `&`/`=` splitting and `urlencoding` decode over a raw URL and
//! body, producing typed `Parameter`s ready for probing.

use crate::model::{ParamLocation, Parameter};

/// Extract query parameters from `raw_url` and, when `content_type`
/// permits it, body parameters from `body`.
///
/// Body parameters are parsed only when `content_type` is empty or
/// equals (case-insensitively, ignoring a `;charset=...` suffix)
/// `application/x-www-form-urlencoded`. Any other content type yields
/// no body parameters.
pub fn parse(raw_url: &str, body: &str, content_type: Option<&str>) -> Vec<Parameter> {
    let mut params = Vec::new();

    let query = raw_url.split_once('?').map(|(_, q)| q).unwrap_or("");
    params.extend(parse_pairs(query, ParamLocation::Query));

    if accepts_form_body(content_type) {
        params.extend(parse_pairs(body, ParamLocation::Body));
    }

    params
}

fn accepts_form_body(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) if ct.trim().is_empty() => true,
        Some(ct) => {
            let base = ct.split(';').next().unwrap_or("").trim();
            base.eq_ignore_ascii_case("application/x-www-form-urlencoded")
        }
    }
}

fn parse_pairs(raw: &str, location: ParamLocation) -> Vec<Parameter> {
    if raw.is_empty() {
        return Vec::new();
    }

    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(key).ok()?.into_owned();
            let value = urlencoding::decode(value).ok()?.into_owned();
            Some(Parameter::new(key, value, location))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParamType;

    #[test]
    fn query_params_are_extracted() {
        let params = parse("https://x.test/a?id=1&name=bob", "", None);
        assert_eq!(params.len(), 2);
        assert!(params.iter().any(|p| p.name == "id"
            && p.location == ParamLocation::Query
            && p.param_type == ParamType::Integer));
        assert!(params
            .iter()
            .any(|p| p.name == "name" && p.param_type == ParamType::String));
    }

    #[test]
    fn form_body_is_parsed_for_default_content_type() {
        let params = parse(
            "https://x.test/login",
            "username=admin&password=secret",
            Some("application/x-www-form-urlencoded; charset=UTF-8"),
        );
        assert_eq!(params.len(), 2);
        assert!(params
            .iter()
            .all(|p| p.location == ParamLocation::Body));
    }

    #[test]
    fn non_form_content_type_yields_no_body_params() {
        let params = parse(
            "https://x.test/api",
            r#"{"id":1}"#,
            Some("application/json"),
        );
        assert!(params.is_empty());
    }

    #[test]
    fn multi_value_keys_produce_multiple_entries() {
        let params = parse("https://x.test/a?tag=a&tag=b", "", None);
        assert_eq!(params.len(), 2);
        assert!(params.iter().all(|p| p.name == "tag"));
    }

    #[test]
    fn float_and_integer_inference() {
        let params = parse("https://x.test/a?x=3.14&y=-5&z=abc", "", None);
        let ty = |n: &str| params.iter().find(|p| p.name == n).unwrap().param_type;
        assert_eq!(ty("x"), ParamType::Float);
        assert_eq!(ty("y"), ParamType::Integer);
        assert_eq!(ty("z"), ParamType::String);
    }
}
