use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::TaskCatalog;
use crate::definition::{DefinitionResult, DomainDefinition};

const LEGAL_DEFINITION: &str = include_str!("../definitions/legal.json");
const FEDERAL_DEFINITION: &str = include_str!("../definitions/federal.json");
const NONPROFIT_DEFINITION: &str = include_str!("../definitions/nonprofit.json");

/// Domains bundled with the crate as JSON definitions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinDomain {
    Legal,
    Federal,
    Nonprofit,
}

impl BuiltinDomain {
    pub const ALL: [Self; 3] = [Self::Legal, Self::Federal, Self::Nonprofit];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legal => "legal",
            Self::Federal => "federal",
            Self::Nonprofit => "nonprofit",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Self::Legal => LEGAL_DEFINITION,
            Self::Federal => FEDERAL_DEFINITION,
            Self::Nonprofit => NONPROFIT_DEFINITION,
        }
    }

    pub fn definition(self) -> DefinitionResult<DomainDefinition> {
        DomainDefinition::from_json_str(self.source())
            .map_err(|error| error.with_domain(self.as_str()))
    }

    pub fn catalog(self) -> DefinitionResult<TaskCatalog> {
        TaskCatalog::build(&self.definition()?)
    }
}

impl fmt::Display for BuiltinDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuiltinDomain {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "legal" => Ok(Self::Legal),
            "federal" => Ok(Self::Federal),
            "nonprofit" => Ok(Self::Nonprofit),
            _ => Err(()),
        }
    }
}
