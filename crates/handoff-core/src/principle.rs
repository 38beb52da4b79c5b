//! The fixed DNA principle sets every contract reports against

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five design principles
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignPrinciple {
    PedagogicalValue,
    PolicyToPractice,
    TimeRespect,
    HolisticThinking,
    ProfessionalTone,
}

impl DesignPrinciple {
    pub const ALL: [DesignPrinciple; 5] = [
        DesignPrinciple::PedagogicalValue,
        DesignPrinciple::PolicyToPractice,
        DesignPrinciple::TimeRespect,
        DesignPrinciple::HolisticThinking,
        DesignPrinciple::ProfessionalTone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DesignPrinciple::PedagogicalValue => "pedagogical_value",
            DesignPrinciple::PolicyToPractice => "policy_to_practice",
            DesignPrinciple::TimeRespect => "time_respect",
            DesignPrinciple::HolisticThinking => "holistic_thinking",
            DesignPrinciple::ProfessionalTone => "professional_tone",
        }
    }

    /// Guidance returned when the principle fails
    pub fn recommendation(&self) -> &'static str {
        match self {
            DesignPrinciple::PedagogicalValue => {
                "tie every interaction to an explicit learning objective"
            }
            DesignPrinciple::PolicyToPractice => {
                "ground the scenario in a concrete workplace situation"
            }
            DesignPrinciple::TimeRespect => "keep the activity completable within the learner's time box",
            DesignPrinciple::HolisticThinking => {
                "show how the decision affects other teams and systems"
            }
            DesignPrinciple::ProfessionalTone => "rewrite copy in a respectful, professional register",
        }
    }
}

/// The four architecture principles
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchitecturePrinciple {
    ApiFirst,
    StatelessBackend,
    SeparationOfConcerns,
    SimplicityFirst,
}

impl ArchitecturePrinciple {
    pub const ALL: [ArchitecturePrinciple; 4] = [
        ArchitecturePrinciple::ApiFirst,
        ArchitecturePrinciple::StatelessBackend,
        ArchitecturePrinciple::SeparationOfConcerns,
        ArchitecturePrinciple::SimplicityFirst,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArchitecturePrinciple::ApiFirst => "api_first",
            ArchitecturePrinciple::StatelessBackend => "stateless_backend",
            ArchitecturePrinciple::SeparationOfConcerns => "separation_of_concerns",
            ArchitecturePrinciple::SimplicityFirst => "simplicity_first",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            ArchitecturePrinciple::ApiFirst => "define the endpoint contract before building the client",
            ArchitecturePrinciple::StatelessBackend => "move session state out of the request handlers",
            ArchitecturePrinciple::SeparationOfConcerns => {
                "split presentation, domain and persistence logic"
            }
            ArchitecturePrinciple::SimplicityFirst => "remove layers the story does not need",
        }
    }
}

/// Which set a principle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipleGroup {
    Design,
    Architecture,
}

impl PrincipleGroup {
    /// Field path of the group inside a contract
    pub fn path(&self) -> &'static str {
        match self {
            PrincipleGroup::Design => "compliance.design_principles",
            PrincipleGroup::Architecture => "compliance.architecture_principles",
        }
    }
}

/// Any of the nine principles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Principle {
    Design(DesignPrinciple),
    Architecture(ArchitecturePrinciple),
}

impl Principle {
    /// All nine principles, design first
    pub const ALL: [Principle; 9] = [
        Principle::Design(DesignPrinciple::PedagogicalValue),
        Principle::Design(DesignPrinciple::PolicyToPractice),
        Principle::Design(DesignPrinciple::TimeRespect),
        Principle::Design(DesignPrinciple::HolisticThinking),
        Principle::Design(DesignPrinciple::ProfessionalTone),
        Principle::Architecture(ArchitecturePrinciple::ApiFirst),
        Principle::Architecture(ArchitecturePrinciple::StatelessBackend),
        Principle::Architecture(ArchitecturePrinciple::SeparationOfConcerns),
        Principle::Architecture(ArchitecturePrinciple::SimplicityFirst),
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Principle::Design(p) => p.as_str(),
            Principle::Architecture(p) => p.as_str(),
        }
    }

    pub fn group(&self) -> PrincipleGroup {
        match self {
            Principle::Design(_) => PrincipleGroup::Design,
            Principle::Architecture(_) => PrincipleGroup::Architecture,
        }
    }

    /// Full field path, e.g. `compliance.design_principles.time_respect`
    pub fn path(&self) -> String {
        format!("{}.{}", self.group().path(), self.name())
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Principle::Design(p) => p.recommendation(),
            Principle::Architecture(p) => p.recommendation(),
        }
    }
}

impl fmt::Display for Principle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field names of the design group, in wire order
pub fn design_field_names() -> [&'static str; 5] {
    DesignPrinciple::ALL.map(|p| p.as_str())
}

/// Field names of the architecture group, in wire order
pub fn architecture_field_names() -> [&'static str; 4] {
    ArchitecturePrinciple::ALL.map(|p| p.as_str())
}
