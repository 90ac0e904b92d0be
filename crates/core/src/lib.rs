#![forbid(unsafe_code)]

pub mod schema;

pub mod names {
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum NameError {
        Empty,
        TooLong,
        InvalidFirstChar,
        InvalidChar { ch: char, index: usize },
    }

    impl std::fmt::Display for NameError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Empty => write!(f, "name is empty"),
                Self::TooLong => write!(f, "name is too long"),
                Self::InvalidFirstChar => write!(f, "name must start with a letter"),
                Self::InvalidChar { ch, index } => {
                    write!(f, "invalid character {ch:?} at index {index}")
                }
            }
        }
    }

    impl std::error::Error for NameError {}

    /// Validates a table or column identifier: ASCII letter first, then
    /// letters, digits and underscores. Identifiers are spliced into
    /// generated physical definitions, so nothing looser is accepted.
    pub fn validate_identifier(value: &str) -> Result<(), NameError> {
        if value.is_empty() {
            return Err(NameError::Empty);
        }
        if value.len() > 128 {
            return Err(NameError::TooLong);
        }
        let mut chars = value.chars();
        let Some(first) = chars.next() else {
            return Err(NameError::Empty);
        };
        if !first.is_ascii_alphabetic() {
            return Err(NameError::InvalidFirstChar);
        }
        for (index, ch) in value.chars().enumerate() {
            if index == 0 {
                continue;
            }
            if ch.is_ascii_alphanumeric() || ch == '_' {
                continue;
            }
            return Err(NameError::InvalidChar { ch, index });
        }
        Ok(())
    }
}
