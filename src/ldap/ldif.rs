//! LDIF reader for provisioning directory entries.
//!
//! Supports the subset needed for bulk imports: comments, folded lines,
//! base64 (`::`) values, an optional `version:` header and `changetype: add`.

use crate::error::{IndexGateError, Result};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// A single directory entry read from LDIF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdifEntry {
    pub dn: String,
    /// Attribute name with its values, in file order.
    pub attributes: Vec<(String, Vec<Vec<u8>>)>,
}

impl LdifEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    pub fn add_value(&mut self, name: &str, value: Vec<u8>) {
        match self
            .attributes
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, values)) => values.push(value),
            None => self.attributes.push((name.to_string(), vec![value])),
        }
    }

    /// First value of `name` as text, if present.
    pub fn first_value(&self, name: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    /// Attribute list in the shape an LDAP add request expects.
    pub fn to_add_attributes(&self) -> Vec<(Vec<u8>, HashSet<Vec<u8>>)> {
        self.attributes
            .iter()
            .map(|(name, values)| (name.as_bytes().to_vec(), values.iter().cloned().collect()))
            .collect()
    }
}

pub struct LdifReader<R> {
    lines: Lines<R>,
    pending: Option<String>,
    line_no: usize,
}

impl LdifReader<BufReader<File>> {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<'a> LdifReader<&'a [u8]> {
    pub fn from_text(content: &'a str) -> Self {
        Self::new(content.as_bytes())
    }
}

impl<R: BufRead> LdifReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            pending: None,
            line_no: 0,
        }
    }

    /// Read the next entry, or `None` at end of input.
    pub fn read_entry(&mut self) -> Result<Option<LdifEntry>> {
        let mut entry: Option<LdifEntry> = None;

        while let Some(line) = self.next_logical_line()? {
            if line.starts_with('#') {
                continue;
            }
            if line.trim().is_empty() {
                if entry.is_some() {
                    break;
                }
                continue;
            }

            let (name, value) = self.parse_attribute(&line)?;
            match entry.as_mut() {
                None => {
                    if name.eq_ignore_ascii_case("version") {
                        continue;
                    }
                    if !name.eq_ignore_ascii_case("dn") {
                        return Err(self.error(format!("expected 'dn:' but found '{}:'", name)));
                    }
                    let dn = String::from_utf8(value)
                        .map_err(|_| self.error("dn is not valid UTF-8"))?;
                    entry = Some(LdifEntry::new(dn));
                }
                Some(current) => {
                    if name.eq_ignore_ascii_case("changetype") {
                        if value != b"add" {
                            return Err(self.error("only 'changetype: add' is supported"));
                        }
                        continue;
                    }
                    current.add_value(&name, value);
                }
            }
        }

        Ok(entry)
    }

    /// Read every remaining entry.
    pub fn read_all(&mut self) -> Result<Vec<LdifEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.read_entry()? {
            entries.push(entry);
        }
        Ok(entries)
    }

    fn next_physical_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        match self.lines.next() {
            Some(line) => {
                self.line_no += 1;
                Ok(Some(line?.trim_end_matches('\r').to_string()))
            }
            None => Ok(None),
        }
    }

    // Folded lines continue with a single leading space.
    fn next_logical_line(&mut self) -> Result<Option<String>> {
        let mut logical = match self.next_physical_line()? {
            Some(line) => line,
            None => return Ok(None),
        };

        while let Some(next) = self.next_physical_line()? {
            match next.strip_prefix(' ') {
                Some(rest) if !logical.is_empty() => logical.push_str(rest),
                _ => {
                    self.pending = Some(next);
                    break;
                }
            }
        }

        Ok(Some(logical))
    }

    fn parse_attribute(&self, line: &str) -> Result<(String, Vec<u8>)> {
        let (name, rest) = line
            .split_once(':')
            .ok_or_else(|| self.error(format!("missing ':' in '{}'", line)))?;

        let value = if let Some(encoded) = rest.strip_prefix(':') {
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| self.error(format!("invalid base64 value for '{}': {}", name, e)))?
        } else if rest.starts_with('<') {
            return Err(self.error(format!("URL values are not supported for '{}'", name)));
        } else {
            rest.trim_start().as_bytes().to_vec()
        };

        Ok((name.trim().to_string(), value))
    }

    fn error(&self, reason: impl Into<String>) -> IndexGateError {
        IndexGateError::Config(format!("LDIF line {}: {}", self.line_no, reason.into()))
    }
}

impl<R: BufRead> Iterator for LdifReader<R> {
    type Item = Result<LdifEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_entry().transpose()
    }
}
