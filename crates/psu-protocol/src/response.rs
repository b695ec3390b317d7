//! Interpretation of instrument replies

use crate::error::ProtocolError;

/// Strip line terminators from a reply
pub fn trim_reply(reply: &str) -> &str {
    reply.trim_end_matches(|c: char| c == '\r' || c == '\n')
}

/// Parse a numeric reply (`"12.500"`, `"+1.25E+01"`, ...)
pub fn parse_number(reply: &str) -> Result<f64, ProtocolError> {
    let text = reply.trim();
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ProtocolError::MalformedResponse(format!("expected a number, got {:?}", text)))
}

/// Parse a boolean reply (`1`/`0`/`ON`/`OFF`)
pub fn parse_bool(reply: &str) -> Result<bool, ProtocolError> {
    let text = reply.trim();
    if text == "1" || text.eq_ignore_ascii_case("ON") {
        Ok(true)
    } else if text == "0" || text.eq_ignore_ascii_case("OFF") {
        Ok(false)
    } else {
        Err(ProtocolError::MalformedResponse(format!(
            "expected a boolean, got {:?}",
            text
        )))
    }
}

/// How a device spells on/off arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutputEncoding {
    /// `ON` / `OFF`
    #[default]
    Word,
    /// `1` / `0`
    Numeric,
}

impl OutputEncoding {
    /// Render an on/off argument
    pub fn render(&self, on: bool) -> &'static str {
        match (self, on) {
            (OutputEncoding::Word, true) => "ON",
            (OutputEncoding::Word, false) => "OFF",
            (OutputEncoding::Numeric, true) => "1",
            (OutputEncoding::Numeric, false) => "0",
        }
    }
}

/// Parsed IEEE-488.2 `*IDN?` reply
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Identity {
    /// Manufacturer
    pub manufacturer: String,
    /// Model number
    pub model: Option<String>,
    /// Serial number
    pub serial: Option<String>,
    /// Firmware revision
    pub firmware: Option<String>,
}

impl Identity {
    /// Parse `manufacturer,model,serial,firmware`; trailing fields may be absent
    pub fn parse(reply: &str) -> Result<Self, ProtocolError> {
        let text = reply.trim();
        if text.is_empty() {
            return Err(ProtocolError::MalformedResponse(
                "empty identification".into(),
            ));
        }

        let mut fields = text.splitn(4, ',').map(str::trim);
        let field = |f: Option<&str>| f.filter(|s| !s.is_empty()).map(str::to_string);

        let manufacturer = fields.next().unwrap_or_default().to_string();
        Ok(Self {
            manufacturer,
            model: field(fields.next()),
            serial: field(fields.next()),
            firmware: field(fields.next()),
        })
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.manufacturer)?;
        if let Some(model) = &self.model {
            write!(f, " {}", model)?;
        }
        if let Some(serial) = &self.serial {
            write!(f, " (s/n {})", serial)?;
        }
        if let Some(firmware) = &self.firmware {
            write!(f, " fw {}", firmware)?;
        }
        Ok(())
    }
}

/// Outcome of `*TST?`, with `DIAG:TEST?` detail when it failed
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SelfTestReport {
    /// Result code; 0 means pass
    pub code: i32,
    /// Diagnostic detail reported after a failure
    pub detail: Option<String>,
}

impl SelfTestReport {
    /// Returns whether the self test passed
    pub fn passed(&self) -> bool {
        self.code == 0
    }
}
