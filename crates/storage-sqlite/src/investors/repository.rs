use std::sync::Arc;

use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;

use holdwatch_core::investors::{InvestorDirectory, InvestorProfile};
use holdwatch_core::Result;

use super::model::InvestorProfileDB;
use crate::db::get_connection;
use crate::errors::{IntoCore, StorageError};
use crate::schema::investor_profiles::dsl::*;

/// Roster of tracked filers. Read-only: profiles are provisioned by
/// migrations.
pub struct InvestorRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
}

impl InvestorRepository {
    pub fn new(pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>) -> Self {
        InvestorRepository { pool }
    }

    fn load(&self, only_active: bool) -> Result<Vec<InvestorProfile>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = investor_profiles
            .select(InvestorProfileDB::as_select())
            .into_boxed();
        if only_active {
            query = query.filter(active.eq(true));
        }
        let rows = query
            .order(investor_id.asc())
            .load::<InvestorProfileDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(InvestorProfile::from).collect())
    }
}

impl InvestorDirectory for InvestorRepository {
    fn list_investors(&self) -> Result<Vec<InvestorProfile>> {
        self.load(false)
    }

    fn active_investors(&self) -> Result<Vec<InvestorProfile>> {
        self.load(true)
    }

    fn get_investor(&self, wanted: &str) -> Result<Option<InvestorProfile>> {
        let mut conn = get_connection(&self.pool)?;
        let row = investor_profiles
            .find(wanted)
            .select(InvestorProfileDB::as_select())
            .first::<InvestorProfileDB>(&mut conn)
            .optional()
            .into_core()?;
        Ok(row.map(InvestorProfile::from))
    }
}
