//! Schema for the source-import cache.
//!
//! `paths`/`objects`/`refs` describe store objects the cache knows
//! about; `source_mappings`/`source_files` relate a walked source tree
//! (with per-entry stamps) to the store path its import produced.

pub const SCHEMA_SQL: &str = r#"
create table if not exists paths (
    id   integer primary key autoincrement not null,
    path text unique not null
);

create table if not exists objects (
    id       integer primary key not null references paths(id) on delete cascade,
    nar_size integer,
    nar_hash text,
    ca       text
);

create table if not exists refs (
    referrer  integer not null references objects(id) on delete cascade,
    reference integer not null references paths(id) on delete restrict,
    primary key (referrer, reference)
);

create index if not exists refs_reference on refs(reference);

create table if not exists source_mappings (
    mapping_id    integer primary key autoincrement not null,
    store_path_id integer not null references paths(id) on delete cascade
);

create index if not exists source_mappings_store_path on source_mappings(store_path_id);

create table if not exists source_files (
    mapping_id integer not null references source_mappings(mapping_id) on delete cascade,
    path       text not null,
    stamp      text not null,
    primary key (mapping_id, path)
);

create index if not exists source_files_path on source_files(path);
"#;

/// The transient walk relation. Lives in the TEMP schema of one
/// connection and is dropped on every exit path from an import.
pub const WALK_CREATE_SQL: &str = r#"
create temp table walk_curr (
    path        text primary key not null,
    mode        integer not null,
    size        integer not null,
    link_target text,
    stamp       text not null
) without rowid;
"#;

pub const WALK_DROP_SQL: &str = "drop table if exists temp.walk_curr;";
