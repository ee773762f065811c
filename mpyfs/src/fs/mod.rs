//! Remote filesystem operations over the raw REPL.
//!
//! Each operation builds a batch of MicroPython statements with the
//! typed builders in [`literal`] and runs it as one raw-mode
//! conversation. Nothing here touches the port directly; everything
//! goes through [`crate::repl::raw::run_batch`].

pub mod literal;

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::port::Port;
use crate::repl::raw::run_batch;

/// Payload bytes carried by one upload write statement.
pub const PUT_CHUNK: usize = 256;

/// Device name the support library is installed under.
pub const LIB_NAME: &str = "mpython.py";

/// List the files in the device's flash filesystem, in device order.
pub fn ls<P: Port + ?Sized>(port: &mut P) -> Result<Vec<String>> {
    let commands = vec!["import os;print(os.listdir())".to_string()];
    let out = run_batch(port, &commands, false)?;
    let text = String::from_utf8_lossy(&out);
    literal::parse_str_list(text.trim())
}

/// Remove a file on the device.
pub fn rm<P: Port + ?Sized>(port: &mut P, filename: &str) -> Result<()> {
    info!("Removing {filename}");
    let commands = vec![format!("import os;os.remove({})", literal::py_str(filename))];
    run_batch(port, &commands, false)?;
    Ok(())
}

/// Rename a file on the device.
pub fn rename<P: Port + ?Sized>(port: &mut P, from: &str, to: &str) -> Result<()> {
    info!("Renaming {from} -> {to}");
    let commands = vec![format!(
        "import os;os.rename({}, {})",
        literal::py_str(from),
        literal::py_str(to)
    )];
    run_batch(port, &commands, false)?;
    Ok(())
}

/// Build the statement batch that writes `content` to `target`.
///
/// Open-for-binary-write, one write statement per 256-byte chunk in
/// file order, and a trailing close. The close is appended here so an
/// upload can never end without it.
pub fn encode_put_commands(target: &str, content: &[u8]) -> Vec<String> {
    let mut commands = Vec::with_capacity(content.len().div_ceil(PUT_CHUNK) + 3);
    commands.push(format!(
        "import os;fd = open({}, 'wb')",
        literal::py_str(target)
    ));
    commands.push("f = fd.write".to_string());
    for chunk in content.chunks(PUT_CHUNK) {
        commands.push(literal::write_statement(chunk));
    }
    commands.push("fd.close()".to_string());
    commands
}

/// Decode the payload of an upload batch built by [`encode_put_commands`].
pub fn decode_write_statements(commands: &[String]) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    for command in commands {
        if command.starts_with("f(") {
            content.extend_from_slice(&literal::parse_write_statement(command)?);
        }
    }
    Ok(content)
}

/// Upload in-memory content to `target` on the device.
pub fn put_bytes<P: Port + ?Sized>(port: &mut P, target: &str, content: &[u8]) -> Result<()> {
    info!("Uploading {} bytes to {target}", content.len());
    let commands = encode_put_commands(target, content);
    run_batch(port, &commands, false)?;
    Ok(())
}

/// Upload a local file to the device.
///
/// The remote name defaults to the local basename.
pub fn put<P: Port + ?Sized>(port: &mut P, local: &Path, target: Option<&str>) -> Result<()> {
    if !local.is_file() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("No such file: {}", local.display()),
        )));
    }
    let content = std::fs::read(local)?;
    let basename = local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let target = target.unwrap_or(&basename);
    put_bytes(port, target, &content)
}

/// Download a textual file from the device.
///
/// The read loop prints line by line through the device's stdout, which
/// doubles carriage returns; the duplicates are collapsed afterwards.
pub fn get<P: Port + ?Sized>(port: &mut P, filename: &str) -> Result<Vec<u8>> {
    info!("Downloading {filename}");
    let commands = vec![
        format!("import os;f=open({},'rU')", literal::py_str(filename)),
        "for line in f:\n    print(line,end='')\n".to_string(),
        "f.close()".to_string(),
    ];
    let out = run_batch(port, &commands, true)?;
    Ok(normalize_line_endings(out))
}

/// Collapse `\r\r\n` runs back to `\r\n`, repeating to a fixpoint.
fn normalize_line_endings(mut data: Vec<u8>) -> Vec<u8> {
    loop {
        let mut out = Vec::with_capacity(data.len());
        let mut i = 0;
        let mut changed = false;
        while i < data.len() {
            if data[i..].starts_with(b"\r\r\n") {
                out.extend_from_slice(b"\r\n");
                i += 3;
                changed = true;
            } else {
                out.push(data[i]);
                i += 1;
            }
        }
        data = out;
        if !changed {
            return data;
        }
    }
}

/// Render the `main.py` trampoline that starts `filename` on boot.
pub fn boot_trampoline(filename: &str) -> String {
    format!("exec(open('./{filename}').read(),globals())")
}

/// Decode a trampoline line back to the target filename.
///
/// Inspection is by literal prefix and quote position only; a `main.py`
/// with real code in it decodes to `None` rather than a guess.
pub fn decode_boot_trampoline(line: &str) -> Option<String> {
    let rest = line.strip_prefix("exec(open('")?;
    let target = rest.split('\'').next()?;
    if target.is_empty() {
        return None;
    }
    Some(target.strip_prefix("./").unwrap_or(target).to_string())
}

/// Make `filename` the program run on boot by rewriting `main.py` to a
/// one-line trampoline.
pub fn set_boot<P: Port + ?Sized>(port: &mut P, filename: &str) -> Result<()> {
    info!("Setting boot target to {filename}");
    let commands = vec![format!(
        "import os;f=open('main.py', 'wb');f.write({});f.close()",
        literal::py_str(&boot_trampoline(filename))
    )];
    run_batch(port, &commands, false)?;
    Ok(())
}

/// Read which file `main.py` currently trampolines to, if any.
pub fn boot_target<P: Port + ?Sized>(port: &mut P) -> Result<Option<String>> {
    let commands = vec![
        "import os;f=open('main.py','rU')".to_string(),
        "for line in f:\n    print(line,end='')\n    break\n".to_string(),
        "f.close()".to_string(),
    ];
    let out = run_batch(port, &commands, false)?;
    let line = String::from_utf8_lossy(&out);
    Ok(decode_boot_trampoline(line.trim_end()))
}

/// Install the support library under its fixed device name.
pub fn write_lib<P: Port + ?Sized>(port: &mut P, local: &Path) -> Result<()> {
    if !local.is_file() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("No such file: {}", local.display()),
        )));
    }
    let content = std::fs::read(local)?;
    put_bytes(port, LIB_NAME, &content)
}

/// Query `os.uname()` and decode it into a key/value map.
pub fn uname<P: Port + ?Sized>(port: &mut P) -> Result<BTreeMap<String, String>> {
    let commands = vec!["import os;print(os.uname())".to_string()];
    let out = run_batch(port, &commands, false)?;
    let text = String::from_utf8_lossy(&out);
    parse_uname(text.trim())
}

/// Decode the `(sysname='...', nodename='...', ...)` shape `os.uname()`
/// prints.
pub fn parse_uname(raw: &str) -> Result<BTreeMap<String, String>> {
    let inner = raw
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| Error::Parse(format!("unexpected uname output: {raw}")))?;

    let mut result = BTreeMap::new();
    for item in inner.split(", ") {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| Error::Parse(format!("unexpected uname field: {item}")))?;
        let value = value
            .strip_prefix('\'')
            .and_then(|v| v.strip_suffix('\''))
            .ok_or_else(|| Error::Parse(format!("unexpected uname value: {value}")))?;
        result.insert(key.to_string(), value.to_string());
    }
    if result.is_empty() {
        return Err(Error::Parse(format!("empty uname output: {raw}")));
    }
    debug!("uname: {result:?}");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repl::{RAW_BANNER, SENTINEL};
    use crate::testutil::MockPort;

    fn scripted(responses: &[&[u8]], rearms: usize) -> MockPort {
        let mut entry = Vec::new();
        entry.extend_from_slice(RAW_BANNER);
        entry.extend_from_slice(RAW_BANNER);
        entry.extend_from_slice(SENTINEL);

        let mut port = MockPort::new().with_response(&entry);
        for _ in 0..rearms {
            port = port.with_response(SENTINEL);
        }
        for response in responses {
            let mut framed = Vec::with_capacity(response.len() + 5);
            framed.extend_from_slice(b"OK");
            framed.extend_from_slice(response);
            framed.extend_from_slice(b"\x04\x04>");
            port = port.with_response(&framed);
        }
        port
    }

    #[test]
    fn test_encode_put_600_bytes() {
        let content = vec![0x41u8; 600];
        let commands = encode_put_commands("big.bin", &content);
        assert_eq!(commands.len(), 6);
        assert_eq!(commands[0], "import os;fd = open('big.bin', 'wb')");
        assert_eq!(commands[1], "f = fd.write");
        assert_eq!(commands[5], "fd.close()");

        let chunks: Vec<usize> = commands[2..5]
            .iter()
            .map(|c| literal::parse_write_statement(c).unwrap().len())
            .collect();
        assert_eq!(chunks, vec![256, 256, 88]);
    }

    #[test]
    fn test_encode_put_empty_file_still_closes() {
        let commands = encode_put_commands("empty.txt", &[]);
        assert_eq!(commands.len(), 3);
        assert_eq!(commands.last().map(String::as_str), Some("fd.close()"));
    }

    #[test]
    fn test_put_round_trip_sizes() {
        for size in [0usize, 1, 255, 256, 257, 10_000] {
            let content: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let commands = encode_put_commands("data.bin", &content);
            assert_eq!(decode_write_statements(&commands).unwrap(), content);
        }
    }

    #[test]
    fn test_put_escapes_awkward_filename() {
        let commands = encode_put_commands("it's.py", b"x");
        assert_eq!(commands[0], r"import os;fd = open('it\'s.py', 'wb')");
    }

    #[test]
    fn test_put_rejects_missing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.py");

        let mut port = MockPort::new();
        match put(&mut port, &missing, None) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected a not-found error, got {other:?}"),
        }
        // Nothing reached the wire.
        assert!(port.written.is_empty());
    }

    #[test]
    fn test_put_defaults_to_local_basename() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("blink.py");
        std::fs::write(&local, b"x = 1\n").unwrap();

        let mut port = scripted(&[b"", b"", b"", b""], 1);
        put(&mut port, &local, None).unwrap();
        assert!(port.written_str().contains("fd = open('blink.py', 'wb')"));
    }

    #[test]
    fn test_ls_parses_listing() {
        let mut port = scripted(&[b"['main.py', 'boot.py']\r\n"], 1);
        let files = ls(&mut port).unwrap();
        assert_eq!(files, vec!["main.py", "boot.py"]);
    }

    #[test]
    fn test_ls_is_stable_across_calls() {
        // The board reports directory order as-is; with no intervening
        // writes two listings decode to the same names in the same order.
        let listing: &[u8] = b"['boot.py', 'main.py', 'mpython.py']\r\n";
        let first = ls(&mut scripted(&[listing], 1)).unwrap();
        let second = ls(&mut scripted(&[listing], 1)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec!["boot.py", "main.py", "mpython.py"]);
    }

    #[test]
    fn test_ls_rejects_non_listing_output() {
        let mut port = scripted(&[b"something else\r\n"], 1);
        assert!(matches!(ls(&mut port), Err(Error::Parse(_))));
    }

    #[test]
    fn test_rm_sends_escaped_statement() {
        let mut port = scripted(&[b""], 1);
        rm(&mut port, "o'clock.py").unwrap();
        assert!(
            port.written_str()
                .contains(r"import os;os.remove('o\'clock.py')")
        );
    }

    #[test]
    fn test_normalize_line_endings_fixpoint() {
        assert_eq!(
            normalize_line_endings(b"a\r\r\nb\r\r\r\nc\r\n".to_vec()),
            b"a\r\nb\r\nc\r\n"
        );
    }

    #[test]
    fn test_boot_trampoline_round_trip() {
        let line = boot_trampoline("blink.py");
        assert_eq!(line, "exec(open('./blink.py').read(),globals())");
        assert_eq!(decode_boot_trampoline(&line).as_deref(), Some("blink.py"));
    }

    #[test]
    fn test_decode_boot_trampoline_rejects_real_code() {
        assert!(decode_boot_trampoline("import machine").is_none());
        assert!(decode_boot_trampoline("").is_none());
        assert!(decode_boot_trampoline("exec(open('').read())").is_none());
    }

    #[test]
    fn test_boot_target_reads_trampoline() {
        let mut port = scripted(&[b"exec(open('./app.py').read(),globals())", b"", b""], 1);
        assert_eq!(boot_target(&mut port).unwrap().as_deref(), Some("app.py"));
    }

    #[test]
    fn test_parse_uname() {
        let raw = "(sysname='esp32', nodename='esp32', release='1.12.0', version='v1.12 on 2019-12-20', machine='ESP32 module with ESP32')";
        let parsed = parse_uname(raw).unwrap();
        assert_eq!(parsed.get("sysname").map(String::as_str), Some("esp32"));
        assert_eq!(parsed.get("release").map(String::as_str), Some("1.12.0"));
        assert_eq!(
            parsed.get("version").map(String::as_str),
            Some("v1.12 on 2019-12-20")
        );
    }

    #[test]
    fn test_parse_uname_rejects_garbage() {
        assert!(parse_uname("MicroPython v1.12").is_err());
        assert!(parse_uname("()").is_err());
    }
}
