//! The registration ledger: one `(dataset, map)` tuple per membership.
//!
//! The tuple is the single source of truth for membership. Its table is only
//! created once the first map is registered somewhere; until then every
//! lookup answers as if the ledger were empty.

use crate::construct::{Identity, Map};
use crate::error::Result;
use crate::persist::{map_from_row, select_map_columns, PersistenceGateway, Statement, Value};

pub const REGISTRATION_TABLE: &str = "Registration";

pub const CREATE_REGISTRATION: &str = "
    create table if not exists Registration (
        Dataset_Identity text not null,
        Map_Identity text not null,
        constraint unique_Registration primary key (
            Dataset_Identity,
            Map_Identity
        )
    )
";

pub const CREATE_REGISTRATION_INDEX: &str = "
    create index if not exists Registration_by_Map on Registration (
        Map_Identity
    )
";

pub const INSERT_REGISTRATION: &str = "
    insert into Registration (
        Dataset_Identity,
        Map_Identity
    ) values (?, ?)
";

pub const DELETE_REGISTRATION: &str = "
    delete from Registration
        where Dataset_Identity = ?
        and Map_Identity = ?
";

pub const GET_REGISTRATION: &str = "
    select Map_Identity
        from Registration
        where Dataset_Identity = ?
        and Map_Identity = ?
";

pub const DATASETS_OF_MAP: &str = "
    select Dataset_Identity
        from Registration
        where Map_Identity = ?
        order by Dataset_Identity
";

pub const MAPS_OF_DATASET: &str = "
    select Map_Identity
        from Registration
        where Dataset_Identity = ?
        order by Map_Identity
";

pub const DELETE_DATASET_REGISTRATIONS: &str = "
    delete from Registration
        where Dataset_Identity = ?
";

pub const RENAME_DATASET_REGISTRATIONS: &str = "
    update Registration
        set Dataset_Identity = ?
        where Dataset_Identity = ?
";

pub const MEMBERS_BY_START_TIME: &str = select_map_columns!(
    "join Registration r
        on r.Map_Identity = m.Map_Identity
        where r.Dataset_Identity = ?
        order by m.StartTime, m.Map_Identity"
);

pub const MEMBERS_BY_END_TIME: &str = select_map_columns!(
    "join Registration r
        on r.Map_Identity = m.Map_Identity
        where r.Dataset_Identity = ?
        order by m.EndTime, m.StartTime, m.Map_Identity"
);

pub const MEMBERS_BY_ID: &str = select_map_columns!(
    "join Registration r
        on r.Map_Identity = m.Map_Identity
        where r.Dataset_Identity = ?
        order by m.Map_Identity"
);

pub struct RegistrationLedger<'g, G: PersistenceGateway + ?Sized> {
    gateway: &'g mut G,
}

impl<'g, G: PersistenceGateway + ?Sized> RegistrationLedger<'g, G> {
    pub fn new(gateway: &'g mut G) -> Self {
        Self { gateway }
    }
    fn exists(&mut self) -> Result<bool> {
        self.gateway.table_exists(REGISTRATION_TABLE)
    }
    /// Creates the registration table and its index unless already present.
    pub fn ensure_table(&mut self) -> Result<()> {
        if !self.exists()? {
            self.gateway.execute_script(&[
                Statement::new(CREATE_REGISTRATION),
                Statement::new(CREATE_REGISTRATION_INDEX),
            ])?;
        }
        Ok(())
    }
    pub fn contains(&mut self, dataset: &Identity, map: &Identity) -> Result<bool> {
        if !self.exists()? {
            return Ok(false);
        }
        let rows = self
            .gateway
            .execute(&Statement::new(GET_REGISTRATION).bind(dataset).bind(map))?;
        Ok(!rows.is_empty())
    }
    /// Records the membership, creating the table on first use.
    pub fn insert(&mut self, dataset: &Identity, map: &Identity) -> Result<()> {
        self.ensure_table()?;
        self.gateway
            .execute(&Statement::new(INSERT_REGISTRATION).bind(dataset).bind(map))?;
        Ok(())
    }
    pub fn remove(&mut self, dataset: &Identity, map: &Identity) -> Result<()> {
        if self.exists()? {
            self.gateway
                .execute(&Statement::new(DELETE_REGISTRATION).bind(dataset).bind(map))?;
        }
        Ok(())
    }
    /// Removes every membership of the dataset.
    pub fn remove_dataset(&mut self, dataset: &Identity) -> Result<()> {
        if self.exists()? {
            self.gateway
                .execute(&Statement::new(DELETE_DATASET_REGISTRATIONS).bind(dataset))?;
        }
        Ok(())
    }
    /// Moves every membership of a dataset over to its new identity.
    pub fn rename_dataset(&mut self, from: &Identity, to: &Identity) -> Result<()> {
        if self.exists()? {
            self.gateway
                .execute(&Statement::new(RENAME_DATASET_REGISTRATIONS).bind(to).bind(from))?;
        }
        Ok(())
    }
    fn identities(&mut self, sql: &'static str, key: &Identity) -> Result<Vec<Identity>> {
        if !self.exists()? {
            return Ok(Vec::new());
        }
        self.gateway
            .execute(&Statement::new(sql).bind(key))?
            .iter()
            .map(|row| row.text(0)?.parse())
            .collect()
    }
    pub fn datasets_of(&mut self, map: &Identity) -> Result<Vec<Identity>> {
        self.identities(DATASETS_OF_MAP, map)
    }
    pub fn map_ids_of(&mut self, dataset: &Identity) -> Result<Vec<Identity>> {
        self.identities(MAPS_OF_DATASET, dataset)
    }
    /// Full rows of the members of a dataset, in the order of the statement
    /// (one of the `MEMBERS_BY_*` statements).
    pub fn members_of(&mut self, dataset: &Identity, sql: &'static str) -> Result<Vec<Map>> {
        if !self.exists()? {
            return Ok(Vec::new());
        }
        self.gateway
            .execute(&Statement::with_params(sql, vec![Value::from(dataset)]))?
            .iter()
            .map(map_from_row)
            .collect()
    }
}
