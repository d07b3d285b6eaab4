use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hierarchy::error::{HierarchyError, HierarchyResult};

/// Lowest and highest hierarchy levels
pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 7;

/// Highest level of the division tier; everything above belongs to the entity tier
pub const DIVISION_TOP_LEVEL: u8 = 4;

/// User type code of the individual (non-admin) user
pub const INDIVIDUAL_USER_TYPE: i32 = 1;

/// User type code of the platform root administrator
pub const PLATFORM_ROOT_USER_TYPE: i32 = 2;

/// Rank in the combined hierarchy, 1 (lowest division) to 7 (platform root)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Level(u8);

impl Level {
    pub const TOP: Level = Level(MAX_LEVEL);

    pub fn new(value: i64) -> HierarchyResult<Self> {
        if (MIN_LEVEL as i64..=MAX_LEVEL as i64).contains(&value) {
            Ok(Level(value as u8))
        } else {
            Err(HierarchyError::InvalidLevel(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn tier(self) -> Tier {
        if self.0 <= DIVISION_TOP_LEVEL {
            Tier::Division
        } else {
            Tier::Entity
        }
    }

    /// Zero-based index into the seven level slots
    pub fn slot_index(self) -> usize {
        (self.0 - 1) as usize
    }

    pub fn is_tier_top(self) -> bool {
        self.0 == DIVISION_TOP_LEVEL || self.0 == MAX_LEVEL
    }

    pub fn all() -> impl Iterator<Item = Level> {
        (MIN_LEVEL..=MAX_LEVEL).map(Level)
    }
}

impl TryFrom<i64> for Level {
    type Error = HierarchyError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Level::new(value)
    }
}

impl TryFrom<i16> for Level {
    type Error = HierarchyError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Level::new(value as i64)
    }
}

impl From<Level> for i64 {
    fn from(level: Level) -> Self {
        level.0 as i64
    }
}

impl From<Level> for i16 {
    fn from(level: Level) -> Self {
        level.0 as i16
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two storage tiers of the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Levels 1-4, stored as entity divisions
    Division,
    /// Levels 5-7, stored as entities
    Entity,
}

/// A node type (e.g. "School", "Department") and the level it implies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeType {
    pub name: String,
    pub level: Level,
    /// User type code that administers nodes of this type
    pub admin_user_type: i32,
}

/// Privilege record for a user type code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTypeLevel {
    pub code: i32,
    pub name: String,
    pub level: Level,
    pub is_admin: bool,
}

/// Static lookup tables: level to tier, node type to level, user type to privilege
#[derive(Debug, Clone)]
pub struct HierarchyCatalog {
    node_types: HashMap<String, NodeType>,
    user_types: HashMap<i32, UserTypeLevel>,
}

// (node type, level, admin user type code, admin user type name)
const STANDARD_NODE_TYPES: &[(&str, u8, i32, &str)] = &[
    ("Platform", 7, PLATFORM_ROOT_USER_TYPE, "Root_Admin"),
    ("University", 6, 3, "University_Admin"),
    ("Corporate_Global", 6, 4, "Corporate_Global_Admin"),
    ("School_Chain", 6, 5, "SchoolChain_Admin"),
    ("College", 5, 6, "College_Admin"),
    ("Corporate_Country", 5, 7, "Corporate_Country_Admin"),
    ("School", 5, 8, "School_Admin"),
    ("Department", 4, 9, "Department_Admin"),
    ("Corporate_City", 4, 10, "Corporate_City_Admin"),
    ("Business_Unit", 4, 11, "Business_Unit_Admin"),
    ("Degree", 3, 12, "Degree_Admin"),
    ("Grade", 3, 13, "Grade_Admin"),
    ("Corporate_Locality", 3, 14, "Corporate_Locality_Admin"),
    ("Division", 3, 15, "Division_Admin"),
    ("Semester", 2, 16, "Semester_Admin"),
    ("Section", 1, 17, "Section_Admin"),
];

impl HierarchyCatalog {
    /// Catalog with the platform's built-in node and user types
    pub fn standard() -> Self {
        let mut node_types = HashMap::new();
        let mut user_types = HashMap::new();

        user_types.insert(
            INDIVIDUAL_USER_TYPE,
            UserTypeLevel {
                code: INDIVIDUAL_USER_TYPE,
                name: "Individual".to_string(),
                level: Level(MIN_LEVEL),
                is_admin: false,
            },
        );

        for &(name, level, admin_code, admin_name) in STANDARD_NODE_TYPES {
            node_types.insert(
                normalize_type_name(name),
                NodeType {
                    name: name.to_string(),
                    level: Level(level),
                    admin_user_type: admin_code,
                },
            );
            user_types.insert(
                admin_code,
                UserTypeLevel {
                    code: admin_code,
                    name: admin_name.to_string(),
                    level: Level(level),
                    is_admin: true,
                },
            );
        }

        Self {
            node_types,
            user_types,
        }
    }

    /// Replace the user type table, e.g. with rows loaded from storage
    pub fn with_user_types(mut self, user_types: impl IntoIterator<Item = UserTypeLevel>) -> Self {
        self.user_types = user_types.into_iter().map(|t| (t.code, t)).collect();
        self
    }

    /// TierOf(level): reject anything outside 1-7
    pub fn tier_of(&self, level: i64) -> HierarchyResult<Tier> {
        Level::new(level).map(Level::tier)
    }

    /// PrivilegeLevelOf(userTypeCode)
    pub fn privilege_level_of(&self, user_type: i32) -> Option<Level> {
        self.user_types.get(&user_type).map(|t| t.level)
    }

    pub fn user_type(&self, user_type: i32) -> Option<&UserTypeLevel> {
        self.user_types.get(&user_type)
    }

    pub fn is_admin(&self, user_type: i32) -> bool {
        self.user_types.get(&user_type).is_some_and(|t| t.is_admin)
    }

    pub fn is_platform_root(&self, user_type: i32) -> bool {
        user_type == PLATFORM_ROOT_USER_TYPE
    }

    /// Look up a node type by name; matching ignores case and treats spaces as underscores
    pub fn node_type(&self, name: &str) -> Option<&NodeType> {
        self.node_types.get(&normalize_type_name(name))
    }

    /// Level implied by a node type name, checked against the expected tier
    pub fn level_of_type(&self, name: &str, tier: Tier) -> HierarchyResult<Level> {
        let node_type = self
            .node_type(name)
            .ok_or_else(|| HierarchyError::validation(format!("unknown node type '{}'", name)))?;
        if node_type.level.tier() != tier {
            return Err(HierarchyError::InvalidLevel(node_type.level.into()));
        }
        Ok(node_type.level)
    }

    /// Admin user type for the given node type
    pub fn admin_type_for(&self, node_type: &str) -> Option<i32> {
        self.node_type(node_type).map(|t| t.admin_user_type)
    }
}

impl Default for HierarchyCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

fn normalize_type_name(name: &str) -> String {
    name.trim().replace(' ', "_").to_lowercase()
}
