use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// A naming authority: the database or ontology an identifier belongs to.
///
/// Two data sources are the same authority when their system codes match.
#[derive(Debug, Clone, Copy, Eq, Serialize)]
pub struct DataSource {
    system_code: &'static str,
    full_name: &'static str,
}

impl DataSource {
    pub const WIKIDATA: DataSource = DataSource::new("Wd", "Wikidata");
    pub const ENSEMBL: DataSource = DataSource::new("En", "Ensembl");
    pub const NCBI_GENE: DataSource = DataSource::new("L", "Entrez Gene");
    pub const REFSEQ: DataSource = DataSource::new("Q", "RefSeq");
    pub const UNIPROT: DataSource = DataSource::new("S", "Uniprot-TrEMBL");
    pub const GUIDE_TO_PHARMA: DataSource =
        DataSource::new("Gpt", "Guide to Pharmacology Targets");
    pub const REACTOME: DataSource = DataSource::new("Re", "Reactome");
    pub const COMPLEX_PORTAL: DataSource = DataSource::new("Cpx", "Complex Portal");
    pub const JRC_NANOMATERIALS: DataSource =
        DataSource::new("Nmj", "JRC representative industrial materials");
    pub const ENANOMAPPER: DataSource = DataSource::new("ENM", "eNanoMapper Ontology");

    const ALL: [DataSource; 10] = [
        Self::WIKIDATA,
        Self::ENSEMBL,
        Self::NCBI_GENE,
        Self::REFSEQ,
        Self::UNIPROT,
        Self::GUIDE_TO_PHARMA,
        Self::REACTOME,
        Self::COMPLEX_PORTAL,
        Self::JRC_NANOMATERIALS,
        Self::ENANOMAPPER,
    ];

    pub const fn new(system_code: &'static str, full_name: &'static str) -> Self {
        Self {
            system_code,
            full_name,
        }
    }

    pub fn by_code(code: &str) -> Result<Self, BridgeError> {
        Self::ALL
            .iter()
            .copied()
            .find(|ds| ds.system_code == code)
            .ok_or_else(|| BridgeError::UnknownDataSource(code.to_string()))
    }

    pub fn system_code(&self) -> &'static str {
        self.system_code
    }

    pub fn full_name(&self) -> &'static str {
        self.full_name
    }
}

impl PartialEq for DataSource {
    fn eq(&self, other: &Self) -> bool {
        self.system_code == other.system_code
    }
}

impl Hash for DataSource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.system_code.hash(state);
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.system_code)
    }
}

/// An identifier in one authority's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Xref {
    id: String,
    source: DataSource,
}

impl Xref {
    pub fn new(id: impl Into<String>, source: DataSource) -> Result<Self, BridgeError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(BridgeError::InvalidIdentifier(format!(
                "empty {} identifier",
                source.full_name()
            )));
        }
        let id = if trimmed.len() == id.len() {
            id
        } else {
            trimmed.to_string()
        };
        Ok(Self { id, source })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> DataSource {
        self.source
    }
}

impl fmt::Display for Xref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source.system_code, self.id)
    }
}

/// The dataset a build run produces. Each profile replaces one of the
/// stand-alone loader scripts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    Genes,
    Complexes,
    CoronavirusProteins,
    Humancorona,
    Nanomaterials,
}

impl Profile {
    pub const ALL: [Profile; 5] = [
        Profile::Genes,
        Profile::Complexes,
        Profile::CoronavirusProteins,
        Profile::Humancorona,
        Profile::Nanomaterials,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Genes => "genes",
            Profile::Complexes => "complexes",
            Profile::CoronavirusProteins => "coronavirus-proteins",
            Profile::Humancorona => "humancorona",
            Profile::Nanomaterials => "nanomaterials",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = BridgeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|profile| profile.as_str() == normalized)
            .ok_or_else(|| BridgeError::UnknownProfile(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn xref_equality_is_by_value() {
        let a = Xref::new("Q1", DataSource::WIKIDATA).unwrap();
        let b = Xref::new(String::from("Q1"), DataSource::by_code("Wd").unwrap()).unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        assert!(set.insert(a));
        assert!(!set.insert(b));
    }

    #[test]
    fn same_code_different_authority_differs() {
        let wd = Xref::new("123", DataSource::WIKIDATA).unwrap();
        let ncbi = Xref::new("123", DataSource::NCBI_GENE).unwrap();
        assert_ne!(wd, ncbi);
    }

    #[test]
    fn xref_trims_and_rejects_blank() {
        let x = Xref::new(" P0DTC2 ", DataSource::UNIPROT).unwrap();
        assert_eq!(x.id(), "P0DTC2");
        assert_eq!(x.to_string(), "S:P0DTC2");

        let err = Xref::new("   ", DataSource::UNIPROT).unwrap_err();
        assert_matches!(err, BridgeError::InvalidIdentifier(_));
    }

    #[test]
    fn unknown_system_code() {
        let err = DataSource::by_code("Zz").unwrap_err();
        assert_matches!(err, BridgeError::UnknownDataSource(_));
    }

    #[test]
    fn parse_profile() {
        let profile: Profile = "Coronavirus-Proteins".parse().unwrap();
        assert_eq!(profile, Profile::CoronavirusProteins);
        assert_matches!(
            "proteins".parse::<Profile>(),
            Err(BridgeError::UnknownProfile(_))
        );
    }
}
