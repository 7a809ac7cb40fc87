#![forbid(unsafe_code)]

//! Built-in metadata catalog schema.
//!
//! Zones, users, storage resources, collections, data objects, per-object
//! attribute rows for data objects and collections, access grants with their
//! tokens, and audit rows. The zone table is a cycler: users and resources both
//! reference it, and exploration never continues through it.
//!
//! The table and column names match the DDL in [`crate::backend::seed`].

use crate::types::{ColumnId, Result};

use super::{
    AttributeJoin, ColumnRange, GrantChain, ProtectedTable, QueryConventions, SchemaGraph,
};

/// Column ids of the standard schema.
#[allow(missing_docs)]
pub mod columns {
    use crate::types::ColumnId;

    pub const ZONE_ID: ColumnId = ColumnId(101);
    pub const ZONE_NAME: ColumnId = ColumnId(102);

    pub const USER_ID: ColumnId = ColumnId(201);
    pub const USER_NAME: ColumnId = ColumnId(202);
    pub const USER_TYPE: ColumnId = ColumnId(203);
    pub const USER_ZONE: ColumnId = ColumnId(204);

    pub const RESC_ID: ColumnId = ColumnId(301);
    pub const RESC_NAME: ColumnId = ColumnId(302);
    pub const RESC_ZONE_NAME: ColumnId = ColumnId(303);
    pub const RESC_TYPE_NAME: ColumnId = ColumnId(304);
    pub const RESC_LOC: ColumnId = ColumnId(305);

    pub const DATA_ID: ColumnId = ColumnId(401);
    pub const DATA_COLL_ID: ColumnId = ColumnId(402);
    pub const DATA_NAME: ColumnId = ColumnId(403);
    pub const DATA_REPL_NUM: ColumnId = ColumnId(404);
    pub const DATA_VERSION: ColumnId = ColumnId(405);
    pub const DATA_TYPE_NAME: ColumnId = ColumnId(406);
    pub const DATA_SIZE: ColumnId = ColumnId(407);
    pub const DATA_RESC_NAME: ColumnId = ColumnId(409);
    pub const DATA_PATH: ColumnId = ColumnId(410);
    pub const DATA_OWNER_NAME: ColumnId = ColumnId(411);
    pub const DATA_OWNER_ZONE: ColumnId = ColumnId(412);
    pub const DATA_CREATE_TIME: ColumnId = ColumnId(419);
    pub const DATA_MODIFY_TIME: ColumnId = ColumnId(420);

    pub const COLL_ID: ColumnId = ColumnId(500);
    pub const COLL_NAME: ColumnId = ColumnId(501);
    pub const COLL_PARENT_NAME: ColumnId = ColumnId(502);
    pub const COLL_OWNER_NAME: ColumnId = ColumnId(503);
    pub const COLL_OWNER_ZONE: ColumnId = ColumnId(504);

    pub const META_DATA_ATTR_NAME: ColumnId = ColumnId(600);
    pub const META_DATA_ATTR_VALUE: ColumnId = ColumnId(601);
    pub const META_DATA_ATTR_UNITS: ColumnId = ColumnId(602);
    pub const META_DATA_ATTR_ID: ColumnId = ColumnId(603);

    pub const META_COLL_ATTR_NAME: ColumnId = ColumnId(610);
    pub const META_COLL_ATTR_VALUE: ColumnId = ColumnId(611);
    pub const META_COLL_ATTR_UNITS: ColumnId = ColumnId(612);

    pub const DATA_ACCESS_TYPE: ColumnId = ColumnId(700);
    pub const DATA_ACCESS_NAME: ColumnId = ColumnId(701);
    pub const DATA_TOKEN_NAMESPACE: ColumnId = ColumnId(702);
    pub const DATA_ACCESS_USER_ID: ColumnId = ColumnId(703);
    pub const DATA_ACCESS_DATA_ID: ColumnId = ColumnId(704);

    pub const AUDIT_OBJ_ID: ColumnId = ColumnId(1000);
    pub const AUDIT_USER_ID: ColumnId = ColumnId(1001);
    pub const AUDIT_ACTION_ID: ColumnId = ColumnId(1002);
    pub const AUDIT_COMMENT: ColumnId = ColumnId(1003);
    pub const AUDIT_CREATE_TIME: ColumnId = ColumnId(1004);
}

use columns::*;

const TABLES: &[(&str, &str, bool)] = &[
    ("r_zone_main", "", true),
    ("r_user_main", "", false),
    ("r_resc_main", "", false),
    ("r_coll_main", "", false),
    ("r_data_main", "", false),
    ("r_data_metamap", "r_objt_metamap r_data_metamap", false),
    ("r_data_meta_main", "r_meta_main r_data_meta_main", false),
    ("r_coll_metamap", "r_objt_metamap r_coll_metamap", false),
    ("r_coll_meta_main", "r_meta_main r_coll_meta_main", false),
    ("r_data_access", "r_objt_access r_data_access", false),
    ("r_data_tokn_main", "r_tokn_main r_data_tokn_main", false),
    ("r_objt_audit", "", false),
];

const COLUMNS: &[(ColumnId, &str, &str)] = &[
    (ZONE_ID, "r_zone_main", "zone_id"),
    (ZONE_NAME, "r_zone_main", "zone_name"),
    (USER_ID, "r_user_main", "user_id"),
    (USER_NAME, "r_user_main", "user_name"),
    (USER_TYPE, "r_user_main", "user_type_name"),
    (USER_ZONE, "r_user_main", "zone_name"),
    (RESC_ID, "r_resc_main", "resc_id"),
    (RESC_NAME, "r_resc_main", "resc_name"),
    (RESC_ZONE_NAME, "r_resc_main", "zone_name"),
    (RESC_TYPE_NAME, "r_resc_main", "resc_type_name"),
    (RESC_LOC, "r_resc_main", "resc_loc"),
    (DATA_ID, "r_data_main", "data_id"),
    (DATA_COLL_ID, "r_data_main", "coll_id"),
    (DATA_NAME, "r_data_main", "data_name"),
    (DATA_REPL_NUM, "r_data_main", "data_repl_num"),
    (DATA_VERSION, "r_data_main", "data_version"),
    (DATA_TYPE_NAME, "r_data_main", "data_type_name"),
    (DATA_SIZE, "r_data_main", "data_size"),
    (DATA_RESC_NAME, "r_data_main", "resc_name"),
    (DATA_PATH, "r_data_main", "data_path"),
    (DATA_OWNER_NAME, "r_data_main", "data_owner_name"),
    (DATA_OWNER_ZONE, "r_data_main", "data_owner_zone"),
    (DATA_CREATE_TIME, "r_data_main", "create_ts"),
    (DATA_MODIFY_TIME, "r_data_main", "modify_ts"),
    (COLL_ID, "r_coll_main", "coll_id"),
    (COLL_NAME, "r_coll_main", "coll_name"),
    (COLL_PARENT_NAME, "r_coll_main", "parent_coll_name"),
    (COLL_OWNER_NAME, "r_coll_main", "coll_owner_name"),
    (COLL_OWNER_ZONE, "r_coll_main", "coll_owner_zone"),
    (META_DATA_ATTR_NAME, "r_data_meta_main", "meta_attr_name"),
    (META_DATA_ATTR_VALUE, "r_data_meta_main", "meta_attr_value"),
    (META_DATA_ATTR_UNITS, "r_data_meta_main", "meta_attr_unit"),
    (META_DATA_ATTR_ID, "r_data_meta_main", "meta_id"),
    (META_COLL_ATTR_NAME, "r_coll_meta_main", "meta_attr_name"),
    (META_COLL_ATTR_VALUE, "r_coll_meta_main", "meta_attr_value"),
    (META_COLL_ATTR_UNITS, "r_coll_meta_main", "meta_attr_unit"),
    (DATA_ACCESS_TYPE, "r_data_access", "access_type_id"),
    (DATA_ACCESS_NAME, "r_data_tokn_main", "token_name"),
    (DATA_TOKEN_NAMESPACE, "r_data_tokn_main", "token_namespace"),
    (DATA_ACCESS_USER_ID, "r_data_access", "user_id"),
    (DATA_ACCESS_DATA_ID, "r_data_access", "object_id"),
    (AUDIT_OBJ_ID, "r_objt_audit", "object_id"),
    (AUDIT_USER_ID, "r_objt_audit", "user_id"),
    (AUDIT_ACTION_ID, "r_objt_audit", "action_id"),
    (AUDIT_COMMENT, "r_objt_audit", "r_comment"),
    (AUDIT_CREATE_TIME, "r_objt_audit", "create_ts"),
];

// Registration order is traversal order: from a data object the resource
// link is tried before the access link, so a zone is reached through the
// resource holding the replica.
const LINKS: &[(&str, &str, &str)] = &[
    ("r_coll_main", "r_data_main", "r_coll_main.coll_id = r_data_main.coll_id"),
    ("r_data_main", "r_data_metamap", "r_data_main.data_id = r_data_metamap.object_id"),
    ("r_data_metamap", "r_data_meta_main", "r_data_metamap.meta_id = r_data_meta_main.meta_id"),
    ("r_coll_main", "r_coll_metamap", "r_coll_main.coll_id = r_coll_metamap.object_id"),
    ("r_coll_metamap", "r_coll_meta_main", "r_coll_metamap.meta_id = r_coll_meta_main.meta_id"),
    ("r_data_main", "r_resc_main", "r_data_main.resc_name = r_resc_main.resc_name"),
    ("r_resc_main", "r_zone_main", "r_resc_main.zone_name = r_zone_main.zone_name"),
    ("r_user_main", "r_zone_main", "r_user_main.zone_name = r_zone_main.zone_name"),
    ("r_data_main", "r_data_access", "r_data_main.data_id = r_data_access.object_id"),
    ("r_data_access", "r_data_tokn_main", "r_data_access.access_type_id = r_data_tokn_main.token_id"),
    ("r_data_access", "r_user_main", "r_data_access.user_id = r_user_main.user_id"),
    ("r_data_main", "r_objt_audit", "r_data_main.data_id = r_objt_audit.object_id"),
];

/// Builds and validates the standard schema.
pub fn standard_schema() -> Result<SchemaGraph> {
    let mut graph = SchemaGraph::new();
    for (name, alias, cycler) in TABLES {
        graph.register_table(name, alias, *cycler)?;
    }
    for (id, table, column) in COLUMNS {
        graph.register_column(*id, table, column)?;
    }
    for (left, right, predicate) in LINKS {
        graph.register_link(left, right, predicate)?;
    }
    graph.set_conventions(standard_conventions())?;
    graph.validate()?;
    Ok(graph)
}

/// Conventions of the standard schema.
pub fn standard_conventions() -> QueryConventions {
    QueryConventions {
        canonical_order: vec![COLL_NAME, DATA_NAME, DATA_REPL_NUM],
        restricted_columns: vec![ColumnRange::from(1000..=1099)],
        attribute_joins: vec![
            attribute_join(
                META_DATA_ATTR_NAME,
                META_DATA_ATTR_VALUE,
                "r_data_metamap",
                "r_data_meta_main",
                "r_data_main",
                "data_id",
            ),
            attribute_join(
                META_COLL_ATTR_NAME,
                META_COLL_ATTR_VALUE,
                "r_coll_metamap",
                "r_coll_meta_main",
                "r_coll_main",
                "coll_id",
            ),
        ],
        protected_tables: vec![
            ProtectedTable {
                table: "r_data_main".into(),
                id_column: "data_id".into(),
            },
            ProtectedTable {
                table: "r_coll_main".into(),
                id_column: "coll_id".into(),
            },
        ],
        grant_chain: GrantChain::default(),
        object_id_columns: vec![DATA_ID, COLL_ID],
    }
}

fn attribute_join(
    name_column: ColumnId,
    value_column: ColumnId,
    map_binding: &str,
    meta_binding: &str,
    object_table: &str,
    object_id_column: &str,
) -> AttributeJoin {
    AttributeJoin {
        name_column,
        value_column,
        map_table: "r_objt_metamap".into(),
        map_binding: map_binding.into(),
        meta_table: "r_meta_main".into(),
        meta_binding: meta_binding.into(),
        meta_key: "meta_id".into(),
        map_object_column: "object_id".into(),
        object_table: object_table.into(),
        object_id_column: object_id_column.into(),
    }
}
