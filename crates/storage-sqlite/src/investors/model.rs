//! Database model for investor profiles.

use diesel::prelude::*;

use holdwatch_core::investors::InvestorProfile;

#[derive(Queryable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::investor_profiles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct InvestorProfileDB {
    pub investor_id: String,
    pub name: String,
    pub organization: Option<String>,
    pub external_filer_id: String,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<InvestorProfileDB> for InvestorProfile {
    fn from(db: InvestorProfileDB) -> Self {
        Self {
            investor_id: db.investor_id,
            name: db.name,
            organization: db.organization,
            external_filer_id: db.external_filer_id,
            active: db.active,
        }
    }
}
