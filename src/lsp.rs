//! Stub language server
//!
//! Speaks just enough Content-Length-framed JSON-RPC over stdio to answer
//! `initialize` with empty capabilities and hover requests with a
//! placeholder. Carries no design load; the real endpoint would sit on
//! top of the `Program` API.

use std::io::{self, BufRead, Write};

use serde_json::{json, Value};

pub fn serve() -> io::Result<()> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();

    while let Some(message) = read_message(&mut reader)? {
        let method = message["method"].as_str().unwrap_or_default();
        let id = message["id"].clone();

        match method {
            "initialize" => {
                respond(&mut writer, id, json!({ "capabilities": {} }))?;
            }
            "textDocument/hover" => {
                respond(
                    &mut writer,
                    id,
                    json!({ "contents": { "kind": "plaintext", "value": "hello world" } }),
                )?;
            }
            "shutdown" => {
                respond(&mut writer, id, Value::Null)?;
            }
            "exit" => break,
            _ => {
                // placeholder response for any other request
                if !id.is_null() {
                    respond(&mut writer, id, Value::Null)?;
                }
            }
        }
    }
    Ok(())
}

fn read_message(reader: &mut impl BufRead) -> io::Result<Option<Value>> {
    let mut content_length = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = value.trim().parse::<usize>().ok();
        }
    }

    let Some(length) = content_length else {
        return Ok(None);
    };
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body).ok())
}

fn respond(writer: &mut impl Write, id: Value, result: Value) -> io::Result<()> {
    let message = json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string();
    write!(writer, "Content-Length: {}\r\n\r\n{}", message.len(), message)?;
    writer.flush()
}
