//! Common PostgreSQL wire protocol types.

/// PostgreSQL Object Identifier (OID)
pub type Oid = u32;

// Big-endian integer views used by the packet codec.
pub(crate) type I16BE = zerocopy::byteorder::big_endian::I16;
pub(crate) type I32BE = zerocopy::byteorder::big_endian::I32;

/// Data format code in PostgreSQL protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum FormatCode {
    /// Text format (human-readable)
    #[default]
    Text = 0,
    /// Binary format (type-specific packed representation)
    Binary = 1,
}

impl FormatCode {
    /// Create a FormatCode from a raw u16 value.
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => FormatCode::Binary,
            _ => FormatCode::Text,
        }
    }
}

impl From<u16> for FormatCode {
    fn from(value: u16) -> Self {
        Self::from_u16(value)
    }
}

/// Transaction status indicator from ReadyForQuery message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Idle (not in a transaction block)
    #[default]
    Idle = b'I',
    /// In a transaction block
    InTransaction = b'T',
    /// In a failed transaction block (queries rejected until rollback)
    Failed = b'E',
}

impl TransactionStatus {
    /// Create a TransactionStatus from a raw byte value.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            b'I' => Some(TransactionStatus::Idle),
            b'T' => Some(TransactionStatus::InTransaction),
            b'E' => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    /// Returns true if currently in a transaction (either active or failed).
    pub fn in_transaction(self) -> bool {
        matches!(
            self,
            TransactionStatus::InTransaction | TransactionStatus::Failed
        )
    }
}

/// Type OIDs the value codec understands, scalar and array forms.
pub mod oid {
    use super::Oid;

    /// boolean, format 't'/'f'
    pub const BOOL: Oid = 16;
    /// variable-length byte string
    pub const BYTEA: Oid = 17;
    /// single character
    pub const CHAR: Oid = 18;
    /// 63-byte type for storing system identifiers
    pub const NAME: Oid = 19;
    /// ~18 digit integer, 8-byte storage
    pub const INT8: Oid = 20;
    /// -32 thousand to 32 thousand, 2-byte storage
    pub const INT2: Oid = 21;
    /// -2 billion to 2 billion integer, 4-byte storage
    pub const INT4: Oid = 23;
    /// registered procedure
    pub const REGPROC: Oid = 24;
    /// variable-length string, no limit specified
    pub const TEXT: Oid = 25;
    /// object identifier(oid), maximum 4 billion
    pub const OID: Oid = 26;
    /// tuple physical location, format '(block,offset)'
    pub const TID: Oid = 27;
    /// transaction id
    pub const XID: Oid = 28;
    /// command identifier type, sequence in transaction id
    pub const CID: Oid = 29;
    /// JSON stored as text
    pub const JSON: Oid = 114;
    /// geometric point, format '(x,y)'
    pub const POINT: Oid = 600;
    /// geometric line segment, format '\[point1,point2\]'
    pub const LSEG: Oid = 601;
    /// geometric path, open or closed sequence of points
    pub const PATH: Oid = 602;
    /// geometric box, format 'upper right point,lower left point'
    pub const BOX: Oid = 603;
    /// geometric polygon, format '(point1,...)'
    pub const POLYGON: Oid = 604;
    /// geometric line, format '{A,B,C}'
    pub const LINE: Oid = 628;
    /// network IP address/netmask, network address
    pub const CIDR: Oid = 650;
    /// single-precision floating point number, 4-byte storage
    pub const FLOAT4: Oid = 700;
    /// double-precision floating point number, 8-byte storage
    pub const FLOAT8: Oid = 701;
    /// pseudo-type representing an undetermined type
    pub const UNKNOWN: Oid = 705;
    /// geometric circle, format '<center point,radius>'
    pub const CIRCLE: Oid = 718;
    /// XX:XX:XX:XX:XX:XX, MAC address
    pub const MACADDR: Oid = 829;
    /// IP address/netmask, host address, netmask optional
    pub const INET: Oid = 869;
    /// 'char(length)' blank-padded string, fixed storage length
    pub const BPCHAR: Oid = 1042;
    /// 'varchar(length)' non-blank-padded string, variable storage length
    pub const VARCHAR: Oid = 1043;
    /// date
    pub const DATE: Oid = 1082;
    /// time of day
    pub const TIME: Oid = 1083;
    /// date and time
    pub const TIMESTAMP: Oid = 1114;
    /// date and time with time zone
    pub const TIMESTAMPTZ: Oid = 1184;
    /// time of day with time zone
    pub const TIMETZ: Oid = 1266;
    /// 'numeric(precision, scale)' arbitrary precision number
    pub const NUMERIC: Oid = 1700;
    /// registered class
    pub const REGCLASS: Oid = 2205;
    /// registered type
    pub const REGTYPE: Oid = 2206;
    /// pseudo-type for the result of a function with no real result
    pub const VOID: Oid = 2278;
    /// UUID
    pub const UUID: Oid = 2950;
    /// Binary JSON
    pub const JSONB: Oid = 3802;

    /// array of bool
    pub const BOOL_ARRAY: Oid = 1000;
    /// array of bytea
    pub const BYTEA_ARRAY: Oid = 1001;
    /// array of char
    pub const CHAR_ARRAY: Oid = 1002;
    /// array of name
    pub const NAME_ARRAY: Oid = 1003;
    /// array of int2
    pub const INT2_ARRAY: Oid = 1005;
    /// array of int4
    pub const INT4_ARRAY: Oid = 1007;
    /// array of regproc
    pub const REGPROC_ARRAY: Oid = 1008;
    /// array of text
    pub const TEXT_ARRAY: Oid = 1009;
    /// array of tid
    pub const TID_ARRAY: Oid = 1010;
    /// array of xid
    pub const XID_ARRAY: Oid = 1011;
    /// array of cid
    pub const CID_ARRAY: Oid = 1012;
    /// array of bpchar
    pub const BPCHAR_ARRAY: Oid = 1014;
    /// array of varchar
    pub const VARCHAR_ARRAY: Oid = 1015;
    /// array of int8
    pub const INT8_ARRAY: Oid = 1016;
    /// array of point
    pub const POINT_ARRAY: Oid = 1017;
    /// array of lseg
    pub const LSEG_ARRAY: Oid = 1018;
    /// array of path
    pub const PATH_ARRAY: Oid = 1019;
    /// array of box
    pub const BOX_ARRAY: Oid = 1020;
    /// array of float4
    pub const FLOAT4_ARRAY: Oid = 1021;
    /// array of float8
    pub const FLOAT8_ARRAY: Oid = 1022;
    /// array of polygon
    pub const POLYGON_ARRAY: Oid = 1027;
    /// array of oid
    pub const OID_ARRAY: Oid = 1028;
    /// array of macaddr
    pub const MACADDR_ARRAY: Oid = 1040;
    /// array of inet
    pub const INET_ARRAY: Oid = 1041;
    /// array of timestamp
    pub const TIMESTAMP_ARRAY: Oid = 1115;
    /// array of date
    pub const DATE_ARRAY: Oid = 1182;
    /// array of time
    pub const TIME_ARRAY: Oid = 1183;
    /// array of timestamptz
    pub const TIMESTAMPTZ_ARRAY: Oid = 1185;
    /// array of json
    pub const JSON_ARRAY: Oid = 199;
    /// array of numeric
    pub const NUMERIC_ARRAY: Oid = 1231;
    /// array of timetz
    pub const TIMETZ_ARRAY: Oid = 1270;
    /// array of line
    pub const LINE_ARRAY: Oid = 629;
    /// array of cidr
    pub const CIDR_ARRAY: Oid = 651;
    /// array of circle
    pub const CIRCLE_ARRAY: Oid = 719;
    /// array of regclass
    pub const REGCLASS_ARRAY: Oid = 2210;
    /// array of regtype
    pub const REGTYPE_ARRAY: Oid = 2211;
    /// array of uuid
    pub const UUID_ARRAY: Oid = 2951;
    /// array of jsonb
    pub const JSONB_ARRAY: Oid = 3807;
}
