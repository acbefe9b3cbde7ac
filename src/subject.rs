//! Certificate subject assembly.
//!
//! A [`Subject`] is merged from up to four sources, highest priority first:
//! explicit CLI field overrides, values already present (which makes `CN`
//! first-write-wins), a YAML template, and interactive prompt answers.
//! Empty values and the `-` escape are never stored, and a malformed single
//! field is dropped rather than aborting the whole operation.

use std::collections::BTreeMap;
use std::path::Path;

use inquire::Text;
use log::{debug, warn};
use serde::Deserialize;

use crate::error::Result;
use crate::layout;

/// Literal answer meaning "leave this field unset".
pub const SKIP_SENTINEL: &str = "-";

/// Bounded retries for an invalid interactive answer before the field is
/// skipped.
const PROMPT_ATTEMPTS: usize = 3;

/// The closed set of subject fields, in prompt order. Each variant carries
/// its wire key, prompt text, default and validator as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubjectField {
    Country,
    CommonName,
    State,
    Locality,
    Organization,
    OrganizationalUnit,
    EmailAddress,
}

impl SubjectField {
    pub const ALL: [SubjectField; 7] = [
        SubjectField::Country,
        SubjectField::CommonName,
        SubjectField::State,
        SubjectField::Locality,
        SubjectField::Organization,
        SubjectField::OrganizationalUnit,
        SubjectField::EmailAddress,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SubjectField::Country => "C",
            SubjectField::CommonName => "CN",
            SubjectField::State => "ST",
            SubjectField::Locality => "L",
            SubjectField::Organization => "O",
            SubjectField::OrganizationalUnit => "OU",
            SubjectField::EmailAddress => "emailAddress",
        }
    }

    pub fn prompt_text(self) -> &'static str {
        match self {
            SubjectField::Country => "Enter your Country Name (2 letter code, \"-\" to leave empty)",
            SubjectField::CommonName => "Enter your Common Name (eg, DNS name, \"-\" to leave empty)",
            SubjectField::State => "Enter your State or Province (full name, \"-\" to leave empty)",
            SubjectField::Locality => "Enter your Locality Name (eg, city, \"-\" to leave empty)",
            SubjectField::Organization => {
                "Enter your Organization Name (eg, company, \"-\" to leave empty)"
            }
            SubjectField::OrganizationalUnit => {
                "Enter your Organizational Unit (eg, section, \"-\" to leave empty)"
            }
            SubjectField::EmailAddress => "Enter your email address (\"-\" to leave empty)",
        }
    }

    pub fn default_value(self) -> &'static str {
        match self {
            SubjectField::Country => "US",
            SubjectField::CommonName => "localhost",
            SubjectField::State => "France",
            SubjectField::Locality => "Paris",
            SubjectField::Organization => "Enterprise",
            SubjectField::OrganizationalUnit => "IT",
            SubjectField::EmailAddress => "admin@localhost.fr",
        }
    }

    pub fn validate(self, value: &str) -> bool {
        match self {
            SubjectField::Country => value.chars().count() == 2,
            _ => true,
        }
    }
}

/// A merged, validated subject: field values plus an optional SAN list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject {
    fields: BTreeMap<SubjectField, String>,
    san: Vec<String>,
}

impl Subject {
    /// Store a field value. Returns false (and stores nothing) for empty
    /// values, the `-` escape, invalid values, or a second write to `CN`.
    pub fn set(&mut self, field: SubjectField, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() || value == SKIP_SENTINEL {
            return false;
        }
        if !field.validate(value) {
            warn!("subject => {} : {value:?} dropped (invalid)", field.key());
            return false;
        }
        if field == SubjectField::CommonName && self.fields.contains_key(&SubjectField::CommonName)
        {
            debug!("subject => CN already set, keeping existing value");
            return false;
        }
        debug!("subject => {} : {value} added", field.key());
        self.fields.insert(field, value.to_string());
        true
    }

    pub fn get(&self, field: SubjectField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn common_name(&self) -> Option<&str> {
        self.get(SubjectField::CommonName)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SubjectField, &str)> {
        self.fields.iter().map(|(f, v)| (*f, v.as_str()))
    }

    /// SAN DNS names; an empty list means "no subjectAltName extension".
    pub fn san(&self) -> &[String] {
        &self.san
    }

    pub fn set_san(&mut self, names: Vec<String>) {
        let names: Vec<String> = names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        if !names.is_empty() {
            debug!("subject alt name: DNS:{} added", names.join(", DNS:"));
            self.san = names;
        }
    }
}

/// YAML subject template. SAN is canonically a YAML list of DNS names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubjectTemplate {
    #[serde(rename = "C")]
    pub country: Option<String>,
    #[serde(rename = "CN")]
    pub common_name: Option<String>,
    #[serde(rename = "ST")]
    pub state: Option<String>,
    #[serde(rename = "L")]
    pub locality: Option<String>,
    #[serde(rename = "O")]
    pub organization: Option<String>,
    #[serde(rename = "OU")]
    pub organizational_unit: Option<String>,
    #[serde(rename = "emailAddress")]
    pub email: Option<String>,
    #[serde(default)]
    pub san: Vec<String>,
}

impl SubjectTemplate {
    pub fn from_path(path: &Path) -> Result<Self> {
        layout::check_extension(path, "yaml")?;
        if !path.is_file() {
            return Err(crate::error::CertgenError::NotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    fn get(&self, field: SubjectField) -> Option<&str> {
        match field {
            SubjectField::Country => self.country.as_deref(),
            SubjectField::CommonName => self.common_name.as_deref(),
            SubjectField::State => self.state.as_deref(),
            SubjectField::Locality => self.locality.as_deref(),
            SubjectField::Organization => self.organization.as_deref(),
            SubjectField::OrganizationalUnit => self.organizational_unit.as_deref(),
            SubjectField::EmailAddress => self.email.as_deref(),
        }
    }

    /// A starter template written by `certgen init`.
    pub fn starter() -> &'static str {
        "# certgen subject template\n\
         # Uncomment and edit the fields you want pre-filled.\n\
         #C: \"US\"\n\
         #CN: \"device.example.com\"\n\
         #ST: \"France\"\n\
         #L: \"Paris\"\n\
         #O: \"Enterprise\"\n\
         #OU: \"IT\"\n\
         #emailAddress: \"admin@example.com\"\n\
         #san:\n\
         #  - \"a.example.com\"\n\
         #  - \"b.example.com\"\n"
    }
}

/// Explicit per-field values from the command line; the highest-priority
/// source.
#[derive(Debug, Clone, Default)]
pub struct FieldOverrides {
    pub country: Option<String>,
    pub common_name: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub email: Option<String>,
}

impl FieldOverrides {
    fn get(&self, field: SubjectField) -> Option<&str> {
        match field {
            SubjectField::Country => self.country.as_deref(),
            SubjectField::CommonName => self.common_name.as_deref(),
            SubjectField::State => self.state.as_deref(),
            SubjectField::Locality => self.locality.as_deref(),
            SubjectField::Organization => self.organization.as_deref(),
            SubjectField::OrganizationalUnit => self.organizational_unit.as_deref(),
            SubjectField::EmailAddress => self.email.as_deref(),
        }
    }
}

/// Merges a [`Subject`] from its prioritized sources. Holds no state across
/// invocations; batch callers build one fresh subject per entry.
pub struct SubjectResolver<'a> {
    pub overrides: &'a FieldOverrides,
    pub template: Option<&'a SubjectTemplate>,
    /// SAN names from the command line; these beat the template's list.
    pub san: &'a [String],
    /// Prompt for fields still unset after the other sources applied.
    pub interactive: bool,
}

impl SubjectResolver<'_> {
    /// Build the final subject. `seed_cn` is the entry name in batch mode
    /// (or the `create NAME` argument) and, being applied first, wins the
    /// first-write-wins rule for `CN`.
    pub fn resolve(&self, seed_cn: Option<&str>) -> Result<Subject> {
        let mut subject = Subject::default();

        if let Some(cn) = seed_cn {
            subject.set(SubjectField::CommonName, cn);
        }
        for field in SubjectField::ALL {
            if let Some(value) = self.overrides.get(field) {
                subject.set(field, value);
            }
        }
        if let Some(template) = self.template {
            for field in SubjectField::ALL {
                if let Some(value) = template.get(field) {
                    subject.set(field, value);
                }
            }
        }
        if self.interactive {
            self.prompt_missing(&mut subject)?;
        }

        if !self.san.is_empty() {
            subject.set_san(self.san.to_vec());
        } else if let Some(template) = self.template {
            subject.set_san(template.san.clone());
        }

        Ok(subject)
    }

    fn prompt_missing(&self, subject: &mut Subject) -> Result<()> {
        for field in SubjectField::ALL {
            if subject.get(field).is_some() {
                continue;
            }
            for attempt in 1..=PROMPT_ATTEMPTS {
                let answer = Text::new(field.prompt_text())
                    .with_default(field.default_value())
                    .prompt()?;
                let answer = answer.trim();
                if answer == SKIP_SENTINEL || answer.is_empty() {
                    break;
                }
                if subject.set(field, answer) {
                    break;
                }
                if attempt < PROMPT_ATTEMPTS {
                    println!(
                        "incorrect value for {}: {answer:?}, must be a 2 letter code",
                        field.key()
                    );
                } else {
                    println!("giving up on {}, leaving it unset", field.key());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver<'a>(
        overrides: &'a FieldOverrides,
        template: Option<&'a SubjectTemplate>,
        san: &'a [String],
    ) -> SubjectResolver<'a> {
        SubjectResolver {
            overrides,
            template,
            san,
            interactive: false,
        }
    }

    #[test]
    fn override_beats_template() {
        let overrides = FieldOverrides {
            locality: Some("Lyon".into()),
            ..Default::default()
        };
        let template = SubjectTemplate {
            locality: Some("Paris".into()),
            organization: Some("Enterprise".into()),
            ..Default::default()
        };
        let subject = resolver(&overrides, Some(&template), &[])
            .resolve(None)
            .unwrap();
        assert_eq!(subject.get(SubjectField::Locality), Some("Lyon"));
        assert_eq!(subject.get(SubjectField::Organization), Some("Enterprise"));
    }

    #[test]
    fn common_name_is_first_write_wins() {
        let mut subject = Subject::default();
        assert!(subject.set(SubjectField::CommonName, "alice"));
        assert!(!subject.set(SubjectField::CommonName, "bob"));
        assert_eq!(subject.common_name(), Some("alice"));
    }

    #[test]
    fn seed_cn_wins_over_template() {
        let overrides = FieldOverrides::default();
        let template = SubjectTemplate {
            common_name: Some("template.example.com".into()),
            ..Default::default()
        };
        let subject = resolver(&overrides, Some(&template), &[])
            .resolve(Some("alice"))
            .unwrap();
        assert_eq!(subject.common_name(), Some("alice"));
    }

    #[test]
    fn invalid_country_is_dropped_not_fatal() {
        let overrides = FieldOverrides {
            country: Some("USA".into()),
            organization: Some("Enterprise".into()),
            ..Default::default()
        };
        let subject = resolver(&overrides, None, &[]).resolve(None).unwrap();
        assert_eq!(subject.get(SubjectField::Country), None);
        assert_eq!(subject.get(SubjectField::Organization), Some("Enterprise"));
    }

    #[test]
    fn escape_sentinel_and_empty_are_never_stored() {
        let mut subject = Subject::default();
        assert!(!subject.set(SubjectField::State, "-"));
        assert!(!subject.set(SubjectField::State, ""));
        assert!(!subject.set(SubjectField::State, "  "));
        assert!(subject.is_empty());
    }

    #[test]
    fn cli_san_beats_template_san() {
        let overrides = FieldOverrides::default();
        let template = SubjectTemplate {
            san: vec!["tpl.example.com".into()],
            ..Default::default()
        };
        let cli_san = vec!["cli.example.com".to_string()];
        let subject = resolver(&overrides, Some(&template), &cli_san)
            .resolve(None)
            .unwrap();
        assert_eq!(subject.san(), ["cli.example.com".to_string()]);

        let subject = resolver(&overrides, Some(&template), &[])
            .resolve(None)
            .unwrap();
        assert_eq!(subject.san(), ["tpl.example.com".to_string()]);
    }

    #[test]
    fn template_parses_san_list() {
        let raw = "CN: device.example.com\nsan:\n  - a.example.com\n  - b.example.com\n";
        let template: SubjectTemplate = serde_yaml::from_str(raw).unwrap();
        assert_eq!(template.common_name.as_deref(), Some("device.example.com"));
        assert_eq!(template.san.len(), 2);
    }
}
