//! Table definitions for the peerctl schema
//!
//! Reference ids pointing at records owned by other services (inventory
//! ports, devices, exchange members) are stored as plain integers or
//! composite `"{source}:{id}"` strings, never as foreign keys.

/// CREATE TABLE statements, applied in order at startup
pub const TABLES: &[&str] = &[
    // networks, keyed by ASN; override columns take precedence over the
    // mirrored registry record
    r#"
    CREATE TABLE IF NOT EXISTS peerctl_net (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        asn INTEGER NOT NULL UNIQUE,
        org TEXT,
        policy4_id INTEGER REFERENCES peerctl_policy(id) ON DELETE SET NULL,
        policy6_id INTEGER REFERENCES peerctl_policy(id) ON DELETE SET NULL,
        max_sessions INTEGER NOT NULL DEFAULT 0,
        as_set_override TEXT,
        prefix4_override INTEGER,
        prefix6_override INTEGER,
        network_type_override TEXT,
        ratio_override TEXT,
        scope_override TEXT,
        traffic_override TEXT,
        unicast_override INTEGER,
        multicast_override INTEGER,
        never_via_route_servers_override INTEGER,
        email_override TEXT,
        from_email_override TEXT,
        status TEXT NOT NULL DEFAULT 'ok',
        created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS peerctl_policy (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        net_id INTEGER NOT NULL REFERENCES peerctl_net(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        import_policy TEXT NOT NULL DEFAULT '',
        export_policy TEXT NOT NULL DEFAULT '',
        localpref INTEGER,
        med INTEGER,
        peer_group TEXT,
        status TEXT NOT NULL DEFAULT 'ok',
        created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    // directed "net considers peer a peering partner" relationship
    r#"
    CREATE TABLE IF NOT EXISTS peerctl_peer_net (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        net_id INTEGER NOT NULL REFERENCES peerctl_net(id) ON DELETE CASCADE,
        peer_id INTEGER NOT NULL REFERENCES peerctl_net(id) ON DELETE CASCADE,
        md5 TEXT,
        info_prefixes4 INTEGER,
        info_prefixes6 INTEGER,
        policy4_id INTEGER REFERENCES peerctl_policy(id) ON DELETE SET NULL,
        policy6_id INTEGER REFERENCES peerctl_policy(id) ON DELETE SET NULL,
        status TEXT NOT NULL DEFAULT 'ok',
        created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (net_id, peer_id)
    )
    "#,
    // local attachment point record; port = 0 means floating (manual ips)
    r#"
    CREATE TABLE IF NOT EXISTS peerctl_port_info (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        net_id INTEGER NOT NULL REFERENCES peerctl_net(id) ON DELETE CASCADE,
        ref_id TEXT,
        port INTEGER NOT NULL DEFAULT 0,
        ip_address_4 TEXT,
        ip_address_6 TEXT,
        is_route_server_peer INTEGER,
        mac_address TEXT,
        status TEXT NOT NULL DEFAULT 'ok',
        created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    // per-port policy overrides, port id is owned by the inventory service
    r#"
    CREATE TABLE IF NOT EXISTS peerctl_port_policy (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        port INTEGER NOT NULL UNIQUE,
        policy4_id INTEGER REFERENCES peerctl_policy(id) ON DELETE SET NULL,
        policy6_id INTEGER REFERENCES peerctl_policy(id) ON DELETE SET NULL,
        status TEXT NOT NULL DEFAULT 'ok',
        created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS peerctl_peer_port (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        peer_net_id INTEGER NOT NULL REFERENCES peerctl_peer_net(id) ON DELETE CASCADE,
        port_info_id INTEGER NOT NULL REFERENCES peerctl_port_info(id) ON DELETE CASCADE,
        interface_name TEXT,
        status TEXT NOT NULL DEFAULT 'ok',
        created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (port_info_id, peer_net_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS peerctl_peer_session (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        port INTEGER,
        peer_port_id INTEGER NOT NULL REFERENCES peerctl_peer_port(id) ON DELETE CASCADE,
        device INTEGER,
        peer_session_type TEXT NOT NULL DEFAULT 'peer',
        policy4_id INTEGER REFERENCES peerctl_policy(id) ON DELETE SET NULL,
        policy6_id INTEGER REFERENCES peerctl_policy(id) ON DELETE SET NULL,
        meta4 TEXT,
        meta6 TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (port, peer_port_id)
    )
    "#,
    // one row per "request peering" workflow invocation
    r#"
    CREATE TABLE IF NOT EXISTS peerctl_peer_request (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        net_id INTEGER NOT NULL REFERENCES peerctl_net(id) ON DELETE CASCADE,
        peer_asn INTEGER NOT NULL,
        type TEXT NOT NULL DEFAULT 'email',
        notes TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS peerctl_peer_request_location (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        peer_request_id INTEGER NOT NULL REFERENCES peerctl_peer_request(id) ON DELETE CASCADE,
        pdb_ix_id INTEGER,
        ixctl_ix_id INTEGER,
        notes TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    // local mirror of external exchange records, created lazily
    r#"
    CREATE TABLE IF NOT EXISTS peerctl_ix (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        name_long TEXT NOT NULL DEFAULT '',
        country TEXT NOT NULL DEFAULT '',
        ref_id TEXT UNIQUE,
        status TEXT NOT NULL DEFAULT 'ok',
        created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    // append-only
    r#"
    CREATE TABLE IF NOT EXISTS peerctl_auditlog (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        net_id INTEGER NOT NULL REFERENCES peerctl_net(id) ON DELETE CASCADE,
        event TEXT NOT NULL,
        user TEXT NOT NULL,
        data TEXT,
        created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    // append-only apart from the status send-queue marker
    r#"
    CREATE TABLE IF NOT EXISTS peerctl_email_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        net_id INTEGER NOT NULL REFERENCES peerctl_net(id) ON DELETE CASCADE,
        user TEXT NOT NULL,
        sender_address TEXT NOT NULL,
        subject TEXT NOT NULL,
        body TEXT NOT NULL,
        origin TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'ok',
        created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS peerctl_email_log_recipient (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email_log_id INTEGER NOT NULL REFERENCES peerctl_email_log(id) ON DELETE CASCADE,
        email TEXT NOT NULL,
        asn INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS peerctl_email_template (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        net_id INTEGER NOT NULL REFERENCES peerctl_net(id) ON DELETE CASCADE,
        kind TEXT NOT NULL,
        name TEXT NOT NULL,
        body TEXT,
        is_default INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'ok',
        created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (net_id, name)
    )
    "#,
];
