// https://dev.mysql.com/doc/dev/mysql-server/latest/group__group__cs__capabilities__flags.html
// https://mariadb.com/kb/en/library/connection/#capabilities

bitflags::bitflags! {
    /// Capability set exchanged in the greeting and the client auth packet.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        const LONG_PASSWORD = 0x0000_0001;
        const FOUND_ROWS = 0x0000_0002;
        const LONG_FLAG = 0x0000_0004;
        // database name may be sent in the auth packet
        const CONNECT_WITH_DB = 0x0000_0008;
        // do not permit `database.table.column`
        const NO_SCHEMA = 0x0000_0010;
        const COMPRESS = 0x0000_0020;
        const ODBC = 0x0000_0040;
        const LOCAL_FILES = 0x0000_0080;
        const IGNORE_SPACE = 0x0000_0100;
        const PROTOCOL_41 = 0x0000_0200;
        // wait_interactive_timeout instead of wait_timeout
        const INTERACTIVE = 0x0000_0400;
        const SSL = 0x0000_0800;
        const IGNORE_SIGPIPE = 0x0000_1000;
        // EOF packets carry transaction status flags
        const TRANSACTIONS = 0x0000_2000;
        const RESERVED = 0x0000_4000;
        // 4.1+ scramble authentication
        const SECURE_CONNECTION = 0x0000_8000;
        const MULTI_STATEMENTS = 0x0001_0000;
        const MULTI_RESULTS = 0x0002_0000;
        const PS_MULTI_RESULTS = 0x0004_0000;
        const PLUGIN_AUTH = 0x0008_0000;
        const CONNECT_ATTRS = 0x0010_0000;
        const PLUGIN_AUTH_LENENC_CLIENT_DATA = 0x0020_0000;
        const CAN_HANDLE_EXPIRED_PASSWORDS = 0x0040_0000;
        const SESSION_TRACK = 0x0080_0000;
        // OK packets replace EOF packets in result sets
        const DEPRECATE_EOF = 0x0100_0000;
        const OPTIONAL_RESULTSET_METADATA = 0x0200_0000;
        const ZSTD_COMPRESSION = 0x0400_0000;
        const QUERY_ATTRIBUTES = 0x0800_0000;
    }
}

impl Capabilities {
    /// Offered capabilities the client always declines.
    pub const EXCLUDED: Self = Self::INTERACTIVE
        .union(Self::SSL)
        .union(Self::ODBC)
        .union(Self::NO_SCHEMA);

    /// Capabilities the client always requests.
    pub const INCLUDED: Self = Self::CONNECT_WITH_DB.union(Self::TRANSACTIONS);

    /// Features this engine does not implement; claiming any of them would
    /// change the shape of packets the dispatcher and streamer expect.
    pub const UNSUPPORTED: Self = Self::COMPRESS
        .union(Self::LOCAL_FILES)
        .union(Self::MULTI_STATEMENTS)
        .union(Self::MULTI_RESULTS)
        .union(Self::PS_MULTI_RESULTS)
        .union(Self::CONNECT_ATTRS)
        .union(Self::SESSION_TRACK)
        .union(Self::DEPRECATE_EOF)
        .union(Self::OPTIONAL_RESULTSET_METADATA)
        .union(Self::ZSTD_COMPRESSION)
        .union(Self::QUERY_ATTRIBUTES);

    /// Compute the client capability set from the server's offer.
    pub fn negotiate(server: Self) -> Self {
        server
            .difference(Self::EXCLUDED)
            .difference(Self::UNSUPPORTED)
            .union(Self::INCLUDED)
    }
}
