#![forbid(unsafe_code)]

//! DDL for the standard catalog and a small demo population.
//!
//! The tables mirror [`crate::catalog::standard`]: every column registered
//! there exists here under the same name, plus the group membership and
//! token tables consulted by the grant chain.

use rusqlite::{params, Connection};
use tracing::info;

use crate::query::AccessLevel;
use crate::types::BackendError;

const STANDARD_DDL: &str = "
create table if not exists r_zone_main (
    zone_id integer primary key,
    zone_name text not null unique
);
create table if not exists r_user_main (
    user_id integer primary key,
    user_name text not null,
    user_type_name text not null,
    zone_name text not null
);
create table if not exists r_user_group (
    group_user_id integer not null,
    user_id integer not null
);
create table if not exists r_resc_main (
    resc_id integer primary key,
    resc_name text not null unique,
    zone_name text not null,
    resc_type_name text not null,
    resc_loc text not null
);
create table if not exists r_coll_main (
    coll_id integer primary key,
    coll_name text not null unique,
    parent_coll_name text not null,
    coll_owner_name text not null,
    coll_owner_zone text not null
);
create table if not exists r_data_main (
    data_id integer not null,
    coll_id integer not null,
    data_name text not null,
    data_repl_num integer not null,
    data_version text not null default '',
    data_type_name text not null default 'generic',
    data_size integer not null,
    resc_name text not null,
    data_path text not null,
    data_owner_name text not null,
    data_owner_zone text not null,
    create_ts text not null,
    modify_ts text not null
);
create table if not exists r_meta_main (
    meta_id integer primary key,
    meta_attr_name text not null,
    meta_attr_value text not null,
    meta_attr_unit text not null default ''
);
create table if not exists r_objt_metamap (
    object_id integer not null,
    meta_id integer not null
);
create table if not exists r_objt_access (
    object_id integer not null,
    user_id integer not null,
    access_type_id integer not null
);
create table if not exists r_tokn_main (
    token_namespace text not null,
    token_id integer not null,
    token_name text not null
);
create table if not exists r_objt_audit (
    object_id integer not null,
    user_id integer not null,
    action_id integer not null,
    r_comment text not null default '',
    create_ts text not null
);
create index if not exists idx_data_coll on r_data_main (coll_id);
create index if not exists idx_metamap_object on r_objt_metamap (object_id);
create index if not exists idx_access_object on r_objt_access (object_id);
";

/// Token ids of the access levels; a grant satisfies every level at or below it.
const ACCESS_TOKENS: &[(i64, &str)] = &[(1050, "read object"), (1120, "modify object"), (1200, "own")];

fn token_id(level: AccessLevel) -> i64 {
    match level {
        AccessLevel::Read => 1050,
        AccessLevel::Modify => 1120,
        AccessLevel::Own => 1200,
    }
}

/// Creates the standard catalog tables and access tokens. Idempotent.
pub fn create_standard_tables(conn: &Connection) -> Result<(), BackendError> {
    conn.execute_batch(STANDARD_DDL)?;
    for (id, name) in ACCESS_TOKENS {
        let present: i64 = conn.query_row(
            "select count(*) from r_tokn_main where token_namespace = 'access_type' and token_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if present == 0 {
            conn.execute(
                "insert into r_tokn_main (token_namespace, token_id, token_name) values ('access_type', ?1, ?2)",
                params![id, name],
            )?;
        }
    }
    Ok(())
}

/// Inserts catalog rows with generated ids.
pub struct Seeder<'c> {
    conn: &'c Connection,
    next_id: i64,
    timestamp: String,
}

impl<'c> Seeder<'c> {
    /// Creates a seeder allocating ids from 10000.
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            next_id: 10000,
            timestamp: "01700000000".into(),
        }
    }

    fn allocate(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Adds a zone.
    pub fn zone(&mut self, name: &str) -> Result<i64, BackendError> {
        let id = self.allocate();
        self.conn.execute(
            "insert into r_zone_main (zone_id, zone_name) values (?1, ?2)",
            params![id, name],
        )?;
        Ok(id)
    }

    /// Adds a user who is a member of its own group.
    pub fn user(&mut self, name: &str, zone: &str, user_type: &str) -> Result<i64, BackendError> {
        let id = self.allocate();
        self.conn.execute(
            "insert into r_user_main (user_id, user_name, user_type_name, zone_name) values (?1, ?2, ?3, ?4)",
            params![id, name, user_type, zone],
        )?;
        self.add_to_group(id, id)?;
        Ok(id)
    }

    /// Adds a group; grants to it reach every member.
    pub fn group(&mut self, name: &str, zone: &str) -> Result<i64, BackendError> {
        let id = self.allocate();
        self.conn.execute(
            "insert into r_user_main (user_id, user_name, user_type_name, zone_name) values (?1, ?2, 'rodsgroup', ?3)",
            params![id, name, zone],
        )?;
        Ok(id)
    }

    /// Makes `user_id` a member of `group_id`.
    pub fn add_to_group(&mut self, user_id: i64, group_id: i64) -> Result<(), BackendError> {
        self.conn.execute(
            "insert into r_user_group (group_user_id, user_id) values (?1, ?2)",
            params![group_id, user_id],
        )?;
        Ok(())
    }

    /// Adds a storage resource.
    pub fn resource(&mut self, name: &str, zone: &str, location: &str) -> Result<i64, BackendError> {
        let id = self.allocate();
        self.conn.execute(
            "insert into r_resc_main (resc_id, resc_name, zone_name, resc_type_name, resc_loc) \
             values (?1, ?2, ?3, 'unixfilesystem', ?4)",
            params![id, name, zone, location],
        )?;
        Ok(id)
    }

    /// Adds a collection; the parent name is derived from the path.
    pub fn collection(&mut self, path: &str, owner: &str, zone: &str) -> Result<i64, BackendError> {
        let id = self.allocate();
        let parent = match path.rfind('/') {
            Some(0) | None => "/",
            Some(at) => &path[..at],
        };
        self.conn.execute(
            "insert into r_coll_main (coll_id, coll_name, parent_coll_name, coll_owner_name, coll_owner_zone) \
             values (?1, ?2, ?3, ?4, ?5)",
            params![id, path, parent, owner, zone],
        )?;
        Ok(id)
    }

    /// Adds replica 0 of a data object.
    #[allow(clippy::too_many_arguments)]
    pub fn data_object(
        &mut self,
        coll_id: i64,
        coll_path: &str,
        name: &str,
        resource: &str,
        owner: &str,
        zone: &str,
        size: i64,
    ) -> Result<i64, BackendError> {
        let id = self.allocate();
        self.replica(id, coll_id, coll_path, name, resource, owner, zone, size, 0)?;
        Ok(id)
    }

    /// Adds a replica row for an existing object id.
    #[allow(clippy::too_many_arguments)]
    pub fn replica(
        &mut self,
        data_id: i64,
        coll_id: i64,
        coll_path: &str,
        name: &str,
        resource: &str,
        owner: &str,
        zone: &str,
        size: i64,
        repl_num: i64,
    ) -> Result<(), BackendError> {
        let path = format!("/var/lib/{resource}{coll_path}/{name}");
        self.conn.execute(
            "insert into r_data_main (data_id, coll_id, data_name, data_repl_num, data_size, resc_name, \
             data_path, data_owner_name, data_owner_zone, create_ts, modify_ts) \
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![data_id, coll_id, name, repl_num, size, resource, path, owner, zone, self.timestamp],
        )?;
        Ok(())
    }

    /// Attaches an attribute to a data object or collection.
    pub fn metadata(
        &mut self,
        object_id: i64,
        name: &str,
        value: &str,
        unit: &str,
    ) -> Result<i64, BackendError> {
        let id = self.allocate();
        self.conn.execute(
            "insert into r_meta_main (meta_id, meta_attr_name, meta_attr_value, meta_attr_unit) values (?1, ?2, ?3, ?4)",
            params![id, name, value, unit],
        )?;
        self.conn.execute(
            "insert into r_objt_metamap (object_id, meta_id) values (?1, ?2)",
            params![object_id, id],
        )?;
        Ok(id)
    }

    /// Grants `level` on an object to a user or group.
    pub fn grant(&mut self, object_id: i64, user_id: i64, level: AccessLevel) -> Result<(), BackendError> {
        self.conn.execute(
            "insert into r_objt_access (object_id, user_id, access_type_id) values (?1, ?2, ?3)",
            params![object_id, user_id, token_id(level)],
        )?;
        Ok(())
    }

    /// Records an audit entry.
    pub fn audit(
        &mut self,
        object_id: i64,
        user_id: i64,
        action_id: i64,
        comment: &str,
    ) -> Result<(), BackendError> {
        self.conn.execute(
            "insert into r_objt_audit (object_id, user_id, action_id, r_comment, create_ts) values (?1, ?2, ?3, ?4, ?5)",
            params![object_id, user_id, action_id, comment, self.timestamp],
        )?;
        Ok(())
    }
}

/// Row counts of the demo population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoSummary {
    /// Data objects created.
    pub data_objects: usize,
    /// Collections created.
    pub collections: usize,
    /// Attributes attached.
    pub attributes: usize,
}

/// Creates the standard tables and a small demo zone:
/// `alice` owns 25 objects `run01.dat`..`run25.dat` under
/// `/tempZone/home/alice`, `bob` owns 3 under `/tempZone/home/bob`, and the
/// `public` group (which `anonymous` belongs to) may read `run01.dat`.
pub fn seed_demo(conn: &Connection) -> Result<DemoSummary, BackendError> {
    create_standard_tables(conn)?;
    let mut seeder = Seeder::new(conn);
    let zone = "tempZone";
    seeder.zone(zone)?;
    let rods = seeder.user("rods", zone, "rodsadmin")?;
    let alice = seeder.user("alice", zone, "rodsuser")?;
    let bob = seeder.user("bob", zone, "rodsuser")?;
    let anonymous = seeder.user("anonymous", zone, "rodsuser")?;
    let public = seeder.group("public", zone)?;
    seeder.add_to_group(anonymous, public)?;
    seeder.add_to_group(alice, public)?;
    seeder.add_to_group(bob, public)?;
    seeder.resource("demoResc", zone, "localhost")?;

    let mut summary = DemoSummary {
        data_objects: 0,
        collections: 0,
        attributes: 0,
    };
    for path in ["/tempZone", "/tempZone/home"] {
        seeder.collection(path, "rods", zone)?;
        summary.collections += 1;
    }

    let alice_home = "/tempZone/home/alice";
    let alice_coll = seeder.collection(alice_home, "alice", zone)?;
    seeder.grant(alice_coll, alice, AccessLevel::Own)?;
    seeder.metadata(alice_coll, "project", "survey", "")?;
    summary.collections += 1;
    summary.attributes += 1;
    for n in 1..=25i64 {
        let name = format!("run{n:02}.dat");
        let id = seeder.data_object(alice_coll, alice_home, &name, "demoResc", "alice", zone, n * 100)?;
        seeder.grant(id, alice, AccessLevel::Own)?;
        seeder.audit(id, alice, 1000, "create")?;
        summary.data_objects += 1;
        if n == 1 {
            seeder.grant(id, public, AccessLevel::Read)?;
        }
        if n % 5 == 0 {
            seeder.metadata(id, "quality", if n % 10 == 0 { "good" } else { "poor" }, "")?;
            seeder.metadata(id, "temperature", &(n * 4).to_string(), "K")?;
            summary.attributes += 2;
        }
    }

    let bob_home = "/tempZone/home/bob";
    let bob_coll = seeder.collection(bob_home, "bob", zone)?;
    seeder.grant(bob_coll, bob, AccessLevel::Own)?;
    summary.collections += 1;
    for name in ["notes.txt", "plot.png", "raw.bin"] {
        let id = seeder.data_object(bob_coll, bob_home, name, "demoResc", "bob", zone, 42)?;
        seeder.grant(id, bob, AccessLevel::Own)?;
        seeder.grant(id, rods, AccessLevel::Read)?;
        summary.data_objects += 1;
    }

    info!(
        data_objects = summary.data_objects,
        collections = summary.collections,
        attributes = summary.attributes,
        "seed.demo"
    );
    Ok(summary)
}
