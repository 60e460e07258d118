//! Text-level edits of Android resources and sources
//!
//! The template files are small and machine-written, so edits are made with
//! targeted regular expressions that leave the rest of each file, comments
//! and formatting included, byte for byte as it was.

use kiwix_core::error::{Error, Result};
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::path::Path;

const STRING_ELEMENT: &str = r"(?s)(<string\b[^>]*>)(.*?)(</string\s*>)";

fn opening_tag(element: &str) -> String {
    format!(r"<{}\b[^>]*>", regex::escape(element))
}

fn attribute(name: &str) -> String {
    format!(r#"(\s{}\s*=\s*)"([^"]*)""#, regex::escape(name))
}

/// Escape text for use as XML character data
pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape text for use inside a double-quoted XML attribute
pub fn escape_attribute(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

/// Value of attribute `name` inside one opening tag
pub fn attr_value(tag: &str, name: &str) -> Result<Option<String>> {
    let re = Regex::new(&attribute(name))?;
    Ok(re.captures(tag).map(|c| c[2].to_string()))
}

/// Set (or add) attributes on one opening tag
fn set_in_tag(tag: &str, attrs: &[(&str, &str)]) -> Result<String> {
    let mut tag = tag.to_string();
    for (name, value) in attrs {
        let value = escape_attribute(value);
        let re = Regex::new(&attribute(name))?;
        if re.is_match(&tag) {
            tag = re
                .replace(&tag, |c: &Captures| format!("{}\"{}\"", &c[1], value))
                .into_owned();
        } else {
            let end = if tag.ends_with("/>") {
                tag.len() - 2
            } else {
                tag.len() - 1
            };
            let body = &tag[..end];
            let head = body.trim_end();
            let gap = &body[head.len()..];
            tag = format!("{} {}=\"{}\"{}{}", head, name, value, gap, &tag[end..]);
        }
    }
    Ok(tag)
}

/// Replace `from` with `to` in the text of every `<string>` element
///
/// `to` is plain text and gets escaped.
pub fn replace_in_strings(xml: &str, from: &str, to: &str) -> Result<String> {
    let re = Regex::new(STRING_ELEMENT)?;
    let to = escape_text(to);
    Ok(re
        .replace_all(xml, |c: &Captures| {
            format!("{}{}{}", &c[1], c[2].replace(from, &to), &c[3])
        })
        .into_owned())
}

/// Set attributes on `element` tags, restricted to those whose `key`
/// attribute equals the given value when a filter is passed
///
/// Returns the edited text and how many tags changed.
pub fn set_attributes(
    xml: &str,
    element: &str,
    filter: Option<(&str, &str)>,
    attrs: &[(&str, &str)],
) -> Result<(String, usize)> {
    let re = Regex::new(&opening_tag(element))?;
    let mut out = String::with_capacity(xml.len());
    let mut last = 0;
    let mut count = 0;
    for m in re.find_iter(xml) {
        let tag = m.as_str();
        let selected = match filter {
            Some((key, expected)) => attr_value(tag, key)?.as_deref() == Some(expected),
            None => true,
        };
        out.push_str(&xml[last..m.start()]);
        if selected {
            out.push_str(&set_in_tag(tag, attrs)?);
            count += 1;
        } else {
            out.push_str(tag);
        }
        last = m.end();
    }
    out.push_str(&xml[last..]);
    Ok((out, count))
}

/// Rename elements called `from` (opening and closing tags)
pub fn rename_elements(xml: &str, from: &str, to: &str) -> Result<(String, usize)> {
    let re = Regex::new(&format!(r"(</?){}([\s/>])", regex::escape(from)))?;
    let count = re.find_iter(xml).count();
    let renamed = re.replace_all(xml, |c: &Captures| format!("{}{}{}", &c[1], to, &c[2]));
    Ok((renamed.into_owned(), count))
}

/// Remove `element` nodes (self-closing or with content) for which `remove`
/// returns true, along with their indentation and line break
pub fn remove_elements<F>(xml: &str, element: &str, remove: F) -> Result<(String, usize)>
where
    F: Fn(&str) -> Result<bool>,
{
    let name = regex::escape(element);
    let re = Regex::new(&format!(
        r"(?s)[ \t]*<{name}\b[^>]*?(?:/>|>.*?</{name}\s*>)[ \t]*(?:\r?\n)?"
    ))?;
    let mut out = String::with_capacity(xml.len());
    let mut last = 0;
    let mut count = 0;
    for m in re.find_iter(xml) {
        out.push_str(&xml[last..m.start()]);
        if remove(m.as_str())? {
            count += 1;
        } else {
            out.push_str(m.as_str());
        }
        last = m.end();
    }
    out.push_str(&xml[last..]);
    Ok((out, count))
}

/// Drop intent filters that declare a `*.VIEW` action
pub fn remove_view_intent_filters(xml: &str) -> Result<(String, usize)> {
    let action = Regex::new(&opening_tag("action"))?;
    remove_elements(xml, "intent-filter", |block| {
        for tag in action.find_iter(block) {
            if let Some(name) = attr_value(tag.as_str(), "android:name")? {
                if name.ends_with(".VIEW") {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    })
}

/// Drop `<uses-permission>` entries for the given short permission names
pub fn remove_permissions(xml: &str, permissions: &[String]) -> Result<(String, usize)> {
    let names: Vec<String> = permissions
        .iter()
        .map(|p| format!("android.permission.{}", p))
        .collect();
    remove_elements(xml, "uses-permission", |node| {
        let tag_end = node.find('>').map_or(node.len(), |i| i + 1);
        Ok(attr_value(&node[..tag_end], "android:name")?
            .is_some_and(|name| names.contains(&name)))
    })
}

/// Uncomment lines containing `needle`
///
/// Such lines are re-indented by four spaces with a leading `//` removed.
pub fn uncomment_lines(text: &str, needle: &str) -> (String, usize) {
    let mut count = 0;
    let lines: Vec<String> = text
        .lines()
        .map(|line| {
            if !line.contains(needle) {
                return line.to_string();
            }
            count += 1;
            let trimmed = line.trim();
            let code = trimmed.strip_prefix("//").unwrap_or(trimmed).trim();
            format!("    {}", code)
        })
        .collect();
    let mut out = lines.join("\n");
    if text.ends_with('\n') {
        out.push('\n');
    }
    (out, count)
}

/// Text substituted for a descriptor value in templates
pub fn placeholder_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace every `~key~` whose key is a field of `fields`
pub fn substitute_placeholders(template: &str, fields: &Map<String, Value>) -> String {
    fields.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("~{}~", key), &placeholder_text(value))
    })
}

/// Read `path`, apply `edit` and write the result back if it changed
pub fn edit_file<F>(path: &Path, edit: F) -> Result<bool>
where
    F: FnOnce(&str) -> Result<String>,
{
    let original = std::fs::read_to_string(path)
        .map_err(|e| Error::from(e).with_context(format!("reading {}", path.display())))?;
    let edited = edit(&original)?;
    if edited == original {
        return Ok(false);
    }
    std::fs::write(path, edited)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    package="org.kiwix.kiwixmobile"
    android:versionCode="1"
    android:versionName="1.0">
    <uses-permission android:name="android.permission.INTERNET" />
    <uses-permission android:name="android.permission.WRITE_EXTERNAL_STORAGE" />
    <application>
        <activity android:name=".KiwixMobileActivity">
            <intent-filter>
                <action android:name="android.intent.action.MAIN" />
            </intent-filter>
            <intent-filter>
                <action android:name="android.intent.action.VIEW" />
                <data android:scheme="file" />
            </intent-filter>
        </activity>
    </application>
</manifest>
"#;

    #[test]
    fn test_branding_strings() {
        let xml = "<resources>\n  <string name=\"app_name\">Kiwix</string>\n  <!-- Kiwix -->\n  <string name=\"about\">About Kiwix</string>\n</resources>";
        let out = replace_in_strings(xml, "Kiwix", "Wikivoyage").unwrap();
        assert!(out.contains(">Wikivoyage</string>"));
        assert!(out.contains(">About Wikivoyage</string>"));
        assert!(out.contains("<!-- Kiwix -->"));
    }

    #[test]
    fn test_branding_name_is_escaped() {
        let xml = r#"<resources><string name="app_name">Kiwix</string></resources>"#;
        let out = replace_in_strings(xml, "Kiwix", "Tom & Jerry <3").unwrap();
        assert_eq!(
            out,
            r#"<resources><string name="app_name">Tom &amp; Jerry &lt;3</string></resources>"#
        );
    }

    #[test]
    fn test_attribute_values_are_escaped() {
        let xml = r#"<manifest package="a" android:versionName="1.0">"#;
        let (out, _) = set_attributes(
            xml,
            "manifest",
            None,
            &[
                ("android:versionName", r#"1.0 "beta""#),
                ("android:label", "R&D <x>"),
            ],
        )
        .unwrap();
        assert!(out.contains(r#"android:versionName="1.0 &quot;beta&quot;""#));
        assert!(out.contains(r#"android:label="R&amp;D &lt;x&gt;""#));
        assert_eq!(
            attr_value(&out, "android:versionName").unwrap().as_deref(),
            Some("1.0 &quot;beta&quot;")
        );
    }

    #[test]
    fn test_menu_item_hidden() {
        let xml = r#"<menu>
    <item android:id="@+id/menu_openfile" android:showAsAction="always" />
    <item android:id="@+id/menu_search"/>
</menu>"#;
        let (out, count) = set_attributes(
            xml,
            "item",
            Some(("android:id", "@+id/menu_openfile")),
            &[("android:showAsAction", "never"), ("android:visible", "false")],
        )
        .unwrap();
        assert_eq!(count, 1);
        assert!(out.contains(
            r#"<item android:id="@+id/menu_openfile" android:showAsAction="never" android:visible="false" />"#
        ));
        assert!(out.contains(r#"<item android:id="@+id/menu_search"/>"#));
    }

    #[test]
    fn test_manifest_edits() {
        let (out, _) = set_attributes(
            MANIFEST,
            "manifest",
            None,
            &[
                ("package", "org.demo.app"),
                ("android:versionCode", "5"),
                ("android:versionName", "1.0"),
            ],
        )
        .unwrap();
        assert!(out.contains(r#"package="org.demo.app""#));
        assert!(out.contains(r#"android:versionCode="5""#));

        let (out, filters) = remove_view_intent_filters(&out).unwrap();
        assert_eq!(filters, 1);
        assert!(out.contains("action.MAIN"));
        assert!(!out.contains("action.VIEW"));
        assert!(!out.contains("android:scheme"));

        let (out, perms) = remove_permissions(&out, &["INTERNET".to_string()]).unwrap();
        assert_eq!(perms, 1);
        assert!(!out.contains("permission.INTERNET"));
        assert!(out.contains("permission.WRITE_EXTERNAL_STORAGE"));
        assert!(out.contains("    <application>"));
    }

    #[test]
    fn test_rename_elements() {
        let xml = r#"<PreferenceScreen>
    <org.kiwix.kiwixmobile.views.SliderPreference android:key="zoom"/>
    <org.kiwix.kiwixmobile.views.SliderPreferenceX>
    </org.kiwix.kiwixmobile.views.SliderPreferenceX>
</PreferenceScreen>"#;
        let (out, count) = rename_elements(
            xml,
            "org.kiwix.kiwixmobile.views.SliderPreference",
            "org.demo.app.views.SliderPreference",
        )
        .unwrap();
        assert_eq!(count, 1);
        assert!(out.contains("<org.demo.app.views.SliderPreference android:key"));
        assert!(out.contains("<org.kiwix.kiwixmobile.views.SliderPreferenceX>"));
    }

    #[test]
    fn test_uncomment_gradle_line() {
        let gradle = "dependencies {\n  //compile files('content-libs.jar')\n  compile 'x'\n}\n";
        let (out, count) = uncomment_lines(gradle, "content-libs.jar");
        assert_eq!(count, 1);
        assert_eq!(
            out,
            "dependencies {\n    compile files('content-libs.jar')\n  compile 'x'\n}\n"
        );
    }

    #[test]
    fn test_placeholders() {
        let mut fields = Map::new();
        fields.insert("app_name".into(), Value::String("Demo".into()));
        fields.insert("embed_zim".into(), Value::Bool(true));
        fields.insert("enforced_lang".into(), Value::Null);
        fields.insert("zim_size".into(), Value::from(42u64));
        let out = substitute_placeholders(
            "name=~app_name~ embed=~embed_zim~ lang=\"~enforced_lang~\" size=~zim_size~ ~other~",
            &fields,
        );
        assert_eq!(out, "name=Demo embed=true lang=\"\" size=42 ~other~");
    }
}
