//! Origin allow-list.

/// Prefix-based origin allow-list.
///
/// An origin is allowed when it is present and starts with one of the
/// configured prefixes. A `*` entry allows any present origin. A missing
/// origin is never allowed.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    prefixes: Vec<String>,
    allow_any: bool,
}

impl OriginPolicy {
    pub fn new(allowed: &[String]) -> Self {
        let allow_any = allowed.iter().any(|o| o == "*");
        let prefixes = allowed
            .iter()
            .filter(|o| o.as_str() != "*" && !o.is_empty())
            .cloned()
            .collect();

        Self {
            prefixes,
            allow_any,
        }
    }

    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            None => false,
            Some(_) if self.allow_any => true,
            Some(origin) => self.prefixes.iter().any(|p| origin.starts_with(p.as_str())),
        }
    }

    /// `Access-Control-Allow-Origin` value for requests whose origin is not echoed.
    pub fn fallback_origin(&self) -> &str {
        if self.allow_any {
            "*"
        } else {
            self.prefixes.first().map_or("null", String::as_str)
        }
    }
}
