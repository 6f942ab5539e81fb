/// An option advertised by an engine during the `uci` handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct UciOption {
    pub name: String,
    pub option_type: UciOptionType,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UciOptionType {
    Spin { min: i64, max: i64 },
    Check,
    Combo { vars: Vec<String> },
    String,
    Button,
}

const KEYWORDS: [&str; 5] = ["type", "default", "min", "max", "var"];

impl UciOption {
    /// Parses `option name <name> type <type> [default ..] [min ..] [max ..] [var ..]*`.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix("option name ")?;
        let (name, rest) = rest.split_once(" type ")?;

        let mut kind = None;
        let mut default = None;
        let mut min = None;
        let mut max = None;
        let mut vars = Vec::new();

        // Values may contain spaces, so they run until the next keyword.
        let mut tokens = std::iter::once("type")
            .chain(rest.split_whitespace())
            .peekable();
        while let Some(keyword) = tokens.next() {
            let mut value = Vec::new();
            while let Some(token) = tokens.peek() {
                if KEYWORDS.contains(token) {
                    break;
                }
                value.push(*token);
                tokens.next();
            }
            let value = value.join(" ");

            match keyword {
                "type" => kind = Some(value),
                "default" => default = Some(value),
                "min" => min = value.parse::<i64>().ok(),
                "max" => max = value.parse::<i64>().ok(),
                "var" => vars.push(value),
                _ => {}
            }
        }

        let option_type = match kind?.as_str() {
            "spin" => UciOptionType::Spin {
                min: min.unwrap_or(i64::MIN),
                max: max.unwrap_or(i64::MAX),
            },
            "check" => UciOptionType::Check,
            "combo" => UciOptionType::Combo { vars },
            "string" => UciOptionType::String,
            "button" => UciOptionType::Button,
            _ => return None,
        };

        Some(Self {
            name: name.trim().to_string(),
            option_type,
            default: default.filter(|d| !d.is_empty() && d != "<empty>"),
        })
    }
}

impl UciOptionType {
    pub fn validate(&self, value: &str) -> Result<(), String> {
        match self {
            UciOptionType::Spin { min, max } => {
                let parsed = value
                    .parse::<i64>()
                    .map_err(|e| format!("Invalid integer: {}", e))?;
                if parsed < *min || parsed > *max {
                    return Err(format!("Value {} out of range [{}, {}]", parsed, min, max));
                }
                Ok(())
            }
            UciOptionType::Check => match value.to_lowercase().as_str() {
                "true" | "false" => Ok(()),
                _ => Err("Boolean value must be 'true' or 'false'".to_string()),
            },
            UciOptionType::Combo { vars } => {
                if vars.iter().any(|v| v.eq_ignore_ascii_case(value)) {
                    Ok(())
                } else {
                    Err(format!("Value '{}' is not one of {:?}", value, vars))
                }
            }
            UciOptionType::String => Ok(()),
            UciOptionType::Button => {
                if value.is_empty() {
                    Ok(())
                } else {
                    Err("Button options take no value".to_string())
                }
            }
        }
    }
}
