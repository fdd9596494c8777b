pub mod profile_scanner;
pub mod rules;

pub use profile_scanner::{ProfileCatalog, ProfileScanner};
pub use rules::{ClassificationRule, RuleTable};
