//! App descriptors
//!
//! A descriptor is the JSON document describing one custom app. Fields are
//! kept in an ordered JSON map so unknown keys survive untouched and can be
//! substituted into templates like the known ones.

use kiwix_core::error::{Error, ErrorCode, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// Fields every descriptor must provide
pub const REQUIRED_FIELDS: &[&str] = &[
    "app_name",
    "package",
    "version_name",
    "version_code",
    "zim_file",
];

/// Overridable fields holding integers
const INTEGER_FIELDS: &[&str] = &["version_code", "content_version_code"];

/// Overridable fields holding booleans
const BOOLEAN_FIELDS: &[&str] = &["embed_zim"];

const OVERRIDE_PREFIX: &str = "--override-";

/// Values used when the descriptor leaves a field out
///
/// `template_dir` provides the default launcher icon.
pub fn defaults(template_dir: &Path) -> Map<String, Value> {
    let icon = template_dir.join("Kiwix_icon_transparent_512x512.png");
    let mut map = Map::new();
    map.insert("enforced_lang".into(), Value::Null);
    map.insert("embed_zim".into(), Value::Bool(false));
    map.insert("content_version_code".into(), Value::from(0u64));
    map.insert(
        "ic_launcher".into(),
        Value::String(icon.to_string_lossy().into_owned()),
    );
    for image in [
        "feature_image",
        "phone_screenshot",
        "tablet7_screenshot",
        "tablet10_screenshot",
    ] {
        map.insert(image.into(), Value::Null);
    }
    map.insert("category".into(), Value::String(String::new()));
    map.insert("rating".into(), Value::String("everyone".into()));
    map.insert("website".into(), Value::String("http://www.kiwix.org".into()));
    map.insert(
        "email".into(),
        Value::String("contact+android@kiwix.org".into()),
    );
    map.insert(
        "support_email".into(),
        Value::String("contact+android@kiwix.org".into()),
    );
    map
}

/// One `--override-<field>=<value>` flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub field: String,
    pub value: String,
}

impl Override {
    /// Parse a command-line argument; `None` when it is not an override
    pub fn parse(arg: &str) -> Option<Result<Self>> {
        let rest = arg.strip_prefix(OVERRIDE_PREFIX)?;
        Some(match rest.split_once('=') {
            Some((field, value)) if !field.is_empty() => Ok(Self {
                field: field.to_string(),
                value: value.to_string(),
            }),
            _ => Err(Error::new(
                ErrorCode::InvalidOverride,
                format!("Malformed override `{}`", arg),
            )
            .with_suggestion("Use --override-<field>=<value>")),
        })
    }

    /// Split override flags out of a raw argument list
    pub fn extract<I, S>(args: I) -> Result<(Vec<Self>, Vec<String>)>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut overrides = Vec::new();
        let mut rest = Vec::new();
        for arg in args {
            let arg = arg.into();
            match Self::parse(&arg) {
                Some(parsed) => overrides.push(parsed?),
                None => rest.push(arg),
            }
        }
        Ok((overrides, rest))
    }

    /// Typed JSON value for this override
    fn to_value(&self) -> Result<Value> {
        let invalid = |expected: &str| {
            Error::new(
                ErrorCode::InvalidOverride,
                format!(
                    "Invalid value `{}` for {}: expected {}",
                    self.value, self.field, expected
                ),
            )
        };

        if INTEGER_FIELDS.contains(&self.field.as_str()) {
            return self
                .value
                .trim()
                .parse::<u64>()
                .map(Value::from)
                .map_err(|_| invalid("a non-negative integer"));
        }
        if BOOLEAN_FIELDS.contains(&self.field.as_str()) {
            return match self.value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err(invalid("true or false")),
            };
        }
        Ok(Value::String(self.value.clone()))
    }
}

/// A parsed descriptor, before content resolution
#[derive(Debug, Clone, PartialEq)]
pub struct AppDescriptor {
    fields: Map<String, Value>,
}

impl AppDescriptor {
    /// Parse descriptor JSON, filling unset fields from `defaults`
    pub fn parse(json: &str, defaults: Map<String, Value>) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Object(given) = value else {
            return Err(Error::new(
                ErrorCode::DescriptorParse,
                "Descriptor must be a JSON object",
            ));
        };

        let mut fields = defaults;
        for (key, value) in given {
            fields.insert(key, value);
        }
        Ok(Self { fields })
    }

    /// Read and parse a local descriptor file
    pub fn load(path: &Path, defaults: Map<String, Value>) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::file_not_found(path));
        }
        let json = std::fs::read_to_string(path)?;
        Self::parse(&json, defaults)
            .map_err(|e| e.with_context(format!("descriptor {}", path.display())))
    }

    /// Apply overrides in order; later flags win
    pub fn apply_overrides(&mut self, overrides: &[Override]) -> Result<()> {
        for o in overrides {
            let value = o.to_value()?;
            self.fields.insert(o.field.clone(), value);
        }
        Ok(())
    }

    /// Check that every required field is present and not null
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|f| self.fields.get(*f).is_none_or(Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(Error::missing_fields(&missing, REQUIRED_FIELDS));
        }
        self.version_code()?;
        self.content_version_code()?;
        Ok(())
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a field, replacing any previous value
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// String value of `field`; numbers are rendered, null counts as absent
    pub fn text(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn required_text(&self, field: &str) -> Result<String> {
        self.text(field)
            .ok_or_else(|| Error::missing_fields(&[field], REQUIRED_FIELDS))
    }

    pub fn app_name(&self) -> Result<String> {
        self.required_text("app_name")
    }

    pub fn package(&self) -> Result<String> {
        self.required_text("package")
    }

    pub fn version_name(&self) -> Result<String> {
        self.required_text("version_name")
    }

    pub fn zim_file(&self) -> Result<String> {
        self.required_text("zim_file")
    }

    pub fn version_code(&self) -> Result<u64> {
        self.integer("version_code")?
            .ok_or_else(|| Error::missing_fields(&["version_code"], REQUIRED_FIELDS))
    }

    /// Content version, falling back to the app version when unset or zero
    pub fn content_version_code(&self) -> Result<u64> {
        match self.integer("content_version_code")? {
            Some(code) if code > 0 => Ok(code),
            _ => self.version_code(),
        }
    }

    pub fn embed_zim(&self) -> bool {
        match self.fields.get("embed_zim") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.as_str(), "true" | "1" | "yes"),
            Some(Value::Number(n)) => n.as_u64().is_some_and(|n| n != 0),
            _ => false,
        }
    }

    /// Optional `enforced_lang`
    pub fn enforced_lang(&self) -> Option<String> {
        self.text("enforced_lang").filter(|s| !s.is_empty())
    }

    /// Integers may be given as JSON numbers or numeric strings
    fn integer(&self, field: &str) -> Result<Option<u64>> {
        let invalid = || {
            Error::descriptor(format!("Field `{}` must be a non-negative integer", field))
        };
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(invalid),
            Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
            Some(_) => Err(invalid()),
        }
    }

    /// Store-specific section for `store` (e.g. `play_store`)
    pub fn store_section(&self, store: &str) -> Option<&Map<String, Value>> {
        self.fields.get(store).and_then(Value::as_object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const DEMO: &str = r#"{
        "app_name": "Demo",
        "package": "org.demo.app",
        "version_name": "1.0",
        "version_code": 5,
        "zim_file": "demo.zim"
    }"#;

    fn demo() -> AppDescriptor {
        AppDescriptor::parse(DEMO, defaults(&PathBuf::from("/tpl"))).unwrap()
    }

    #[test]
    fn test_defaults_fill_unset_fields() {
        let d = demo();
        d.validate().unwrap();
        assert_eq!(d.text("rating").as_deref(), Some("everyone"));
        assert_eq!(
            d.text("ic_launcher").as_deref(),
            Some("/tpl/Kiwix_icon_transparent_512x512.png")
        );
        assert!(!d.embed_zim());
        assert_eq!(d.enforced_lang(), None);
        assert_eq!(d.content_version_code().unwrap(), 5);
    }

    #[test]
    fn test_missing_fields_are_listed() {
        let d = AppDescriptor::parse(
            r#"{"app_name": "Demo", "version_code": null}"#,
            defaults(Path::new("/tpl")),
        )
        .unwrap();
        let err = d.validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingField);
        assert!(err.message.contains("package, version_name, version_code, zim_file"));
        assert!(err.suggestion.unwrap().contains("app_name"));
    }

    #[test]
    fn test_non_object_is_a_parse_error() {
        let err = AppDescriptor::parse("[1, 2]", Map::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::DescriptorParse);
        let err = AppDescriptor::parse("{not json", Map::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::DescriptorParse);
    }

    #[test]
    fn test_overrides_are_typed_and_ordered() {
        let (overrides, rest) = Override::extract([
            "demo.json",
            "--override-version_code=7",
            "--override-embed_zim=true",
            "--override-app_name=First",
            "--override-app_name=Second",
            "--override-publisher=Kiwix",
            "--build",
        ])
        .unwrap();
        assert_eq!(rest, vec!["demo.json", "--build"]);

        let mut d = demo();
        d.apply_overrides(&overrides).unwrap();
        assert_eq!(d.version_code().unwrap(), 7);
        assert!(d.embed_zim());
        assert_eq!(d.app_name().unwrap(), "Second");
        assert_eq!(d.text("publisher").as_deref(), Some("Kiwix"));
        assert_eq!(d.get("version_code"), Some(&Value::from(7u64)));
    }

    #[test]
    fn test_invalid_override_values() {
        let mut d = demo();
        let bad = Override::parse("--override-version_code=seven").unwrap().unwrap();
        let err = d.apply_overrides(&[bad]).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOverride);

        let err = Override::parse("--override-=x").unwrap().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOverride);
        assert!(Override::parse("--build").is_none());
    }

    #[test]
    fn test_override_can_supply_missing_field() {
        let mut d = AppDescriptor::parse(
            r#"{"app_name": "A", "package": "a.b", "version_name": "1", "version_code": "3"}"#,
            Map::new(),
        )
        .unwrap();
        assert_eq!(d.validate().unwrap_err().code, ErrorCode::MissingField);
        d.apply_overrides(&[Override {
            field: "zim_file".into(),
            value: "x.zim".into(),
        }])
        .unwrap();
        d.validate().unwrap();
        assert_eq!(d.version_code().unwrap(), 3);
    }

    #[test]
    fn test_explicit_content_version_is_kept() {
        let mut d = demo();
        d.set("content_version_code", 2u64);
        assert_eq!(d.content_version_code().unwrap(), 2);
        d.set("version_code", "x");
        assert_eq!(d.validate().unwrap_err().code, ErrorCode::DescriptorError);
    }
}
