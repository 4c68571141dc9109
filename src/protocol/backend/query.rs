//! Query-related backend messages.

use crate::error::{Error, Result};
use crate::protocol::codec::PacketReader;
use crate::protocol::types::{FormatCode, Oid};

/// Descriptor of one column of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// OID of the originating table (0 if not a table column)
    pub table_oid: u32,
    /// Attribute number within the table (0 if not a table column)
    pub column_id: i16,
    /// Data type OID
    pub type_oid: Oid,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: i16,
    /// Type modifier (type-specific)
    pub type_modifier: i32,
    /// Format code of the values in this column
    pub format: FormatCode,
}

/// RowDescription message, the column metadata preceding a result set.
///
/// Columns are copied out of the frame: results retain their description
/// after the read buffer has been reused.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowDescription {
    /// Ordered column descriptors.
    pub columns: Vec<Column>,
}

impl RowDescription {
    /// Parse a RowDescription message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut reader = PacketReader::new(payload);
        let column_count = reader.read_i16()?;

        let mut columns = Vec::with_capacity(column_count.max(0) as usize);
        for _ in 0..column_count {
            let name = reader.read_cstr()?.to_string();
            let table_oid = reader.read_i32()? as u32;
            let column_id = reader.read_i16()?;
            let type_oid = reader.read_i32()? as Oid;
            let type_size = reader.read_i16()?;
            let type_modifier = reader.read_i32()?;
            let format = FormatCode::from_u16(reader.read_i16()? as u16);

            columns.push(Column {
                name,
                table_oid,
                column_id,
                type_oid,
                type_size,
                type_modifier,
                format,
            });
        }

        Ok(Self { columns })
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// DataRow message, one row of a result set.
///
/// Each value is `None` for the NULL sentinel (-1 length) or the raw bytes of
/// the column in the format announced by the RowDescription.
#[derive(Debug, Clone)]
pub struct DataRow<'a> {
    /// Column values, borrowed from the read buffer.
    pub values: Vec<Option<&'a [u8]>>,
}

impl<'a> DataRow<'a> {
    /// Parse a DataRow message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut reader = PacketReader::new(payload);
        let column_count = reader.read_i16()?;

        let mut values = Vec::with_capacity(column_count.max(0) as usize);
        for _ in 0..column_count {
            let len = reader.read_i32()?;
            if len == -1 {
                values.push(None);
            } else if len < 0 {
                return Err(Error::Protocol(format!(
                    "DataRow: invalid column length {}",
                    len
                )));
            } else {
                values.push(Some(reader.read_bytes(len as usize)?));
            }
        }

        Ok(Self { values })
    }

    /// Number of columns in the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// CommandComplete message, the tag ending a successfully executed command.
#[derive(Debug, Clone)]
pub struct CommandComplete {
    /// Raw command tag, e.g. "SELECT 5", "INSERT 0 1", "UPDATE 10".
    pub tag: String,
}

impl CommandComplete {
    /// Parse a CommandComplete message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut reader = PacketReader::new(payload);
        let tag = reader.read_cstr()?.to_string();
        Ok(Self { tag })
    }

    /// The command word of the tag.
    pub fn command(&self) -> Option<&str> {
        self.tag.split_whitespace().next()
    }

    /// The number of rows the command affected, when the tag carries one.
    ///
    /// INSERT tags are "INSERT oid rows"; the other commands are "WORD rows".
    pub fn rows_affected(&self) -> Option<u64> {
        let parts: Vec<&str> = self.tag.split_whitespace().collect();
        match parts.as_slice() {
            ["INSERT", _oid, count] => count.parse().ok(),
            [_, count] => count.parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_description_payload() -> Vec<u8> {
        let mut payload = 2_i16.to_be_bytes().to_vec();
        // column "id": int4 from table 1000, attnum 1
        payload.extend_from_slice(b"id\0");
        payload.extend_from_slice(&1000_i32.to_be_bytes());
        payload.extend_from_slice(&1_i16.to_be_bytes());
        payload.extend_from_slice(&23_i32.to_be_bytes());
        payload.extend_from_slice(&4_i16.to_be_bytes());
        payload.extend_from_slice(&(-1_i32).to_be_bytes());
        payload.extend_from_slice(&0_i16.to_be_bytes());
        // column "name": text
        payload.extend_from_slice(b"name\0");
        payload.extend_from_slice(&0_i32.to_be_bytes());
        payload.extend_from_slice(&0_i16.to_be_bytes());
        payload.extend_from_slice(&25_i32.to_be_bytes());
        payload.extend_from_slice(&(-1_i16).to_be_bytes());
        payload.extend_from_slice(&(-1_i32).to_be_bytes());
        payload.extend_from_slice(&0_i16.to_be_bytes());
        payload
    }

    #[test]
    fn test_parse_row_description() {
        let description = RowDescription::parse(&row_description_payload()).unwrap();
        assert_eq!(description.len(), 2);

        let id = &description.columns[0];
        assert_eq!(id.name, "id");
        assert_eq!(id.table_oid, 1000);
        assert_eq!(id.column_id, 1);
        assert_eq!(id.type_oid, 23);
        assert_eq!(id.format, FormatCode::Text);

        assert_eq!(description.columns[1].name, "name");
        assert_eq!(description.columns[1].type_oid, 25);
    }

    #[test]
    fn test_parse_data_row_with_null() {
        let mut payload = 3_i16.to_be_bytes().to_vec();
        payload.extend_from_slice(&2_i32.to_be_bytes());
        payload.extend_from_slice(b"42");
        payload.extend_from_slice(&(-1_i32).to_be_bytes());
        payload.extend_from_slice(&0_i32.to_be_bytes());

        let row = DataRow::parse(&payload).unwrap();
        assert_eq!(row.len(), 3);
        assert_eq!(row.values[0], Some(b"42".as_slice()));
        assert_eq!(row.values[1], None);
        assert_eq!(row.values[2], Some(b"".as_slice()));
    }

    #[test]
    fn test_parse_data_row_truncated() {
        let mut payload = 1_i16.to_be_bytes().to_vec();
        payload.extend_from_slice(&10_i32.to_be_bytes());
        payload.extend_from_slice(b"abc");
        assert!(DataRow::parse(&payload).is_err());
    }

    #[test]
    fn test_command_complete() {
        let select = CommandComplete::parse(b"SELECT 5\0").unwrap();
        assert_eq!(select.command(), Some("SELECT"));
        assert_eq!(select.rows_affected(), Some(5));

        let insert = CommandComplete::parse(b"INSERT 0 3\0").unwrap();
        assert_eq!(insert.command(), Some("INSERT"));
        assert_eq!(insert.rows_affected(), Some(3));

        let begin = CommandComplete::parse(b"BEGIN\0").unwrap();
        assert_eq!(begin.command(), Some("BEGIN"));
        assert_eq!(begin.rows_affected(), None);
    }
}
