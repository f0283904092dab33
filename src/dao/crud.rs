use std::collections::HashMap;

use crate::network::CRLF;
use crate::pool::PooledConnection;
use crate::service::{AppError, AppResult};

const OP_ADD: &str = "ADD";
const OP_EDIT: &str = "EDIT";
const OP_UPDATE: &str = "UPDATE";

/// Field-dictionary CRUD against broker files.
///
/// Pure request formatting and reply parsing; all I/O goes through the
/// leased connection, and this layer owns no sockets. This is also the only
/// layer that raises [`AppError::Protocol`].
pub struct CrudDao<'a> {
    conn: &'a mut PooledConnection,
}

impl<'a> CrudDao<'a> {
    pub fn new(conn: &'a mut PooledConnection) -> CrudDao<'a> {
        CrudDao { conn }
    }

    /// Creates a record from a field-number/value dictionary and returns
    /// the new record's ien.
    pub async fn create(
        &mut self,
        fields: &HashMap<String, String>,
        file: &str,
        iens: Option<&str>,
    ) -> AppResult<String> {
        let request = build_filer_request(OP_ADD, &create_args(fields, file, iens));
        let reply = self.conn.query(&request).await?;
        parse_record_reply(&reply)
    }

    /// Reads a record into a field-number/value dictionary. Pass an empty
    /// `fields` string to retrieve all fields.
    pub async fn read(
        &mut self,
        ien: &str,
        fields: &str,
        file: &str,
    ) -> AppResult<HashMap<String, String>> {
        let request = build_gets_request(ien, fields, file);
        let reply = self.conn.query(&request).await?;
        parse_field_reply(&reply)
    }

    pub async fn update(
        &mut self,
        fields: &HashMap<String, String>,
        ien: &str,
        file: &str,
    ) -> AppResult<()> {
        let request = build_filer_request(OP_UPDATE, &update_args(fields, ien, file));
        let reply = self.conn.query(&request).await?;
        parse_record_reply(&reply).map(|_| ())
    }

    /// Setting field .01 to "@" deletes the record.
    pub async fn delete(&mut self, ien: &str, file: &str) -> AppResult<()> {
        let args = vec![format!("{file}^.01^{ien}^@")];
        let request = build_filer_request(OP_EDIT, &args);
        let reply = self.conn.query(&request).await?;
        parse_record_reply(&reply).map(|_| ())
    }
}

fn build_filer_request(operation: &str, args: &[String]) -> String {
    let mut lines = Vec::with_capacity(args.len() + 1);
    lines.push(format!("DDR FILER^{operation}"));
    lines.extend(args.iter().cloned());
    lines.join(CRLF)
}

// Argument rows are file^field^iens^value. A new record is addressed as
// "+1," with the parent iens appended when creating inside a subfile.
fn create_args(fields: &HashMap<String, String>, file: &str, iens: Option<&str>) -> Vec<String> {
    fields
        .iter()
        .map(|(field, value)| match iens {
            Some(iens) => format!("{file}^{field}^+1,{iens}^{value}"),
            None => format!("{file}^{field}^+1,^{value}"),
        })
        .collect()
}

fn update_args(fields: &HashMap<String, String>, ien: &str, file: &str) -> Vec<String> {
    fields
        .iter()
        .map(|(field, value)| format!("{file}^{field}^{ien}^{value}"))
        .collect()
}

fn build_gets_request(ien: &str, fields: &str, file: &str) -> String {
    let fields = if fields.is_empty() { "*" } else { fields };
    // the broker wants a trailing comma on the iens string
    let iens = if ien.ends_with(',') {
        ien.to_string()
    } else {
        format!("{ien},")
    };
    format!("DDR GETS ENTRY DATA^{file}^{iens}^{fields}^IN")
}

// A valid create reply looks like "[Data]\r\n+1,^2" where 2 is the ien of
// the new record; a bare "[Data]" means the operation succeeded without
// producing an ien.
fn parse_record_reply(reply: &str) -> AppResult<String> {
    if reply.is_empty() {
        return Err(AppError::Protocol(
            "an empty reply is invalid for a record operation".to_string(),
        ));
    }

    let pieces: Vec<&str> = reply.split(CRLF).collect();

    if pieces.len() > 1 && pieces[1].contains("BEGIN_diERRORS") {
        return Err(AppError::Protocol(reply.to_string()));
    }

    if pieces[0].contains("[Data]") && pieces.len() > 1 {
        return Ok(match pieces[1].find('^') {
            Some(idx) if idx > 0 => pieces[1][idx + 1..].to_string(),
            _ => String::new(),
        });
    }
    Ok("OK".to_string())
}

fn parse_field_reply(reply: &str) -> AppResult<HashMap<String, String>> {
    if reply.is_empty() {
        return Err(AppError::Protocol(
            "an empty reply is invalid for a read operation".to_string(),
        ));
    }
    if reply.contains("BEGIN_diERRORS") {
        return Err(AppError::Protocol(reply.to_string()));
    }

    let mut result = HashMap::new();
    for line in reply.split(CRLF) {
        if line.is_empty() || line.contains("[Data]") {
            continue;
        }
        if let Some((field, value)) = line.split_once('^') {
            result.insert(field.to_string(), value.to_string());
        }
    }
    Ok(result)
}
