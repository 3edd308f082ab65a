use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, ValidationError};

/// A new offer as submitted by the user, before the service assigns an id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferInput {
    pub name: String,
    pub value_props: String,
    pub ideal_use_cases: String,
    #[serde(default)]
    pub target_roles: Vec<String>,
    #[serde(default)]
    pub target_industries: Vec<String>,
}

impl OfferInput {
    /// Trims every field, drops blank role/industry entries and checks that
    /// the name, value propositions and ideal use cases are present.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] naming the first empty
    /// required field.
    pub fn validated(self) -> Result<Self, ValidationError> {
        let clean = |items: Vec<String>| -> Vec<String> {
            items
                .into_iter()
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect()
        };

        let input = Self {
            name: self.name.trim().to_owned(),
            value_props: self.value_props.trim().to_owned(),
            ideal_use_cases: self.ideal_use_cases.trim().to_owned(),
            target_roles: clean(self.target_roles),
            target_industries: clean(self.target_industries),
        };

        if input.name.is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if input.value_props.is_empty() {
            return Err(ValidationError::MissingField("value_props"));
        }
        if input.ideal_use_cases.is_empty() {
            return Err(ValidationError::MissingField("ideal_use_cases"));
        }
        Ok(input)
    }
}

#[derive(Debug, Deserialize)]
pub struct OffersFile {
    pub offers: Vec<OfferInput>,
}

/// Load and validate a YAML file of offers to create in bulk.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or any offer
/// fails validation.
pub fn load_offers_file(path: &Path) -> Result<OffersFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::OffersFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let parsed: OffersFile = serde_yaml::from_str(&content)?;

    let offers = parsed
        .offers
        .into_iter()
        .enumerate()
        .map(|(index, offer)| {
            offer
                .validated()
                .map_err(|source| ConfigError::InvalidOffer { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(OffersFile { offers })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn input(name: &str, value_props: &str, ideal_use_cases: &str) -> OfferInput {
        OfferInput {
            name: name.to_owned(),
            value_props: value_props.to_owned(),
            ideal_use_cases: ideal_use_cases.to_owned(),
            ..OfferInput::default()
        }
    }

    #[test]
    fn validated_trims_and_drops_blank_targets() {
        let offer = OfferInput {
            target_roles: vec![" CEO ".into(), String::new(), "  ".into(), "CTO".into()],
            target_industries: vec!["SaaS".into(), " ".into()],
            ..input("  Outreach Pro ", "More meetings", "Series A startups")
        }
        .validated()
        .unwrap();

        assert_eq!(offer.name, "Outreach Pro");
        assert_eq!(offer.target_roles, vec!["CEO", "CTO"]);
        assert_eq!(offer.target_industries, vec!["SaaS"]);
    }

    #[test]
    fn validated_requires_name() {
        let err = input("   ", "More meetings", "Startups")
            .validated()
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField("name"));
    }

    #[test]
    fn validated_requires_value_props() {
        let err = input("Outreach Pro", "", "Startups").validated().unwrap_err();
        assert_eq!(err, ValidationError::MissingField("value_props"));
    }

    #[test]
    fn validated_requires_ideal_use_cases() {
        let err = input("Outreach Pro", "More meetings", "\n")
            .validated()
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField("ideal_use_cases"));
    }

    #[test]
    fn load_offers_file_parses_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "offers:\n  - name: Outreach Pro\n    value_props: More meetings\n    ideal_use_cases: Startups\n    target_roles: [CEO, ' Founder ']\n"
        )
        .unwrap();

        let parsed = load_offers_file(file.path()).unwrap();
        assert_eq!(parsed.offers.len(), 1);
        assert_eq!(parsed.offers[0].target_roles, vec!["CEO", "Founder"]);
    }

    #[test]
    fn load_offers_file_reports_invalid_entry_index() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "offers:\n  - name: Good\n    value_props: a\n    ideal_use_cases: b\n  - name: Bad\n    value_props: ''\n    ideal_use_cases: b\n"
        )
        .unwrap();

        let err = load_offers_file(file.path()).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidOffer { index: 1, .. }),
            "expected InvalidOffer at index 1, got: {err:?}"
        );
    }

    #[test]
    fn load_offers_file_missing_path_is_io_error() {
        let err = load_offers_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::OffersFileIo { .. }));
    }
}
