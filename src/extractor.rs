// ✂️ Field Extractor - slice rules as data
// Every category is a list of (field, left marker, right boundary) rules,
// interpreted by one slicing routine.

use crate::amount::normalize;
use crate::error::ExtractionError;
use crate::record::{ExtractedFields, TransactionCategory};

// ============================================================================
// RULE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Amount,
    Name,
    Phone,
    Balance,
}

/// Where the value ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Next occurrence of the marker; missing marker is an error
    Until(&'static str),
    /// Next occurrence of the marker, else the end of the body
    UntilOrEnd(&'static str),
    End,
}

/// How much of the sliced text becomes the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Take {
    /// Whole slice, trimmed
    Text,
    /// First n whitespace-separated words, joined by one space
    Words(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceRule {
    pub field: Field,
    /// Only search for `left` after this marker
    pub anchor: Option<&'static str>,
    pub left: &'static str,
    pub right: Boundary,
    pub take: Take,
    /// A failing required rule fails the whole message
    pub required: bool,
}

impl SliceRule {
    pub const fn required(field: Field, left: &'static str, right: Boundary) -> Self {
        SliceRule {
            field,
            anchor: None,
            left,
            right,
            take: Take::Text,
            required: true,
        }
    }

    pub const fn optional(field: Field, left: &'static str, right: Boundary) -> Self {
        SliceRule {
            required: false,
            ..SliceRule::required(field, left, right)
        }
    }

    pub const fn after(self, anchor: &'static str) -> Self {
        SliceRule {
            anchor: Some(anchor),
            ..self
        }
    }

    pub const fn words(self, count: usize) -> Self {
        SliceRule {
            take: Take::Words(count),
            ..self
        }
    }

    /// Slice this rule's value out of the body
    pub fn slice(&self, body: &str) -> Result<String, ExtractionError> {
        let from = match self.anchor {
            Some(anchor) => end_of(body, 0, anchor)?,
            None => 0,
        };
        let start = end_of(body, from, self.left)?;
        let rest = &body[start..];

        let value = match self.right {
            Boundary::Until(marker) => rest
                .find(marker)
                .map(|end| &rest[..end])
                .ok_or_else(|| marker_not_found(marker))?,
            Boundary::UntilOrEnd(marker) => rest.find(marker).map_or(rest, |end| &rest[..end]),
            Boundary::End => rest,
        };

        match self.take {
            Take::Text => Ok(value.trim().to_string()),
            Take::Words(count) => {
                let words: Vec<&str> = value.split_whitespace().take(count).collect();
                if words.len() < count {
                    return Err(ExtractionError::MissingTokens {
                        marker: self.left.to_string(),
                        expected: count,
                        found: words.len(),
                    });
                }
                Ok(words.join(" "))
            }
        }
    }

    /// Anchor and left marker both occur, in order
    fn markers_present(&self, body: &str) -> bool {
        let from = match self.anchor {
            Some(anchor) => match end_of(body, 0, anchor) {
                Ok(from) => from,
                Err(_) => return false,
            },
            None => 0,
        };
        end_of(body, from, self.left).is_ok()
    }

    fn apply(&self, body: &str, fields: &mut ExtractedFields) -> Result<(), ExtractionError> {
        let text = self.slice(body)?;

        match self.field {
            Field::Amount => fields.amount = normalize(&text)?,
            Field::Balance => fields.balance_after = normalize(&text)?,
            Field::Name => fields.counterparty_name = text,
            Field::Phone => fields.phone_number = text,
        }

        Ok(())
    }
}

/// Byte offset just past the first `marker` at or after `from`
fn end_of(body: &str, from: usize, marker: &str) -> Result<usize, ExtractionError> {
    body[from..]
        .find(marker)
        .map(|pos| from + pos + marker.len())
        .ok_or_else(|| marker_not_found(marker))
}

fn marker_not_found(marker: &str) -> ExtractionError {
    ExtractionError::MarkerNotFound {
        marker: marker.to_string(),
    }
}

// ============================================================================
// CATEGORY LAYOUTS
// ============================================================================

#[derive(Debug)]
pub struct CategoryLayout {
    pub category: TransactionCategory,
    pub rules: &'static [SliceRule],
    pub fixed_name: Option<&'static str>,
}

const NEW_BALANCE: SliceRule =
    SliceRule::optional(Field::Balance, "Your new balance:", Boundary::UntilOrEnd("RWF"));

static INCOMING: CategoryLayout = CategoryLayout {
    category: TransactionCategory::Incoming,
    rules: &[
        SliceRule::required(Field::Amount, "received", Boundary::Until("RWF from")),
        SliceRule::required(Field::Name, "RWF from", Boundary::UntilOrEnd("(")),
        SliceRule::optional(Field::Phone, "(", Boundary::Until(")")).after("RWF from"),
        NEW_BALANCE,
    ],
    fixed_name: None,
};

static PAYMENT: CategoryLayout = CategoryLayout {
    category: TransactionCategory::Payment,
    rules: &[
        SliceRule::required(Field::Amount, "Your payment of", Boundary::Until("RWF to")),
        SliceRule::required(Field::Name, "RWF to", Boundary::End).words(2),
        NEW_BALANCE,
    ],
    fixed_name: None,
};

// TODO: "*S*" only covers USSD-initiated transfers; check app-initiated transfer SMS once we have samples
static TRANSFER: CategoryLayout = CategoryLayout {
    category: TransactionCategory::Transfer,
    rules: &[
        SliceRule::required(Field::Amount, "*S*", Boundary::Until("RWF transferred to")),
        SliceRule::required(Field::Name, "RWF transferred to", Boundary::UntilOrEnd("(")),
        SliceRule::optional(Field::Phone, "(", Boundary::Until(")")),
        SliceRule::optional(Field::Balance, "New balance:", Boundary::UntilOrEnd("RWF")),
    ],
    fixed_name: None,
};

static BANK_DEPOSIT: CategoryLayout = CategoryLayout {
    category: TransactionCategory::BankDeposit,
    rules: &[
        SliceRule::required(Field::Amount, "bank deposit of", Boundary::UntilOrEnd("RWF")),
        SliceRule::optional(Field::Balance, "NEW BALANCE :", Boundary::UntilOrEnd("RWF")),
    ],
    fixed_name: Some("Bank"),
};

static WITHDRAWAL: CategoryLayout = CategoryLayout {
    category: TransactionCategory::Withdrawal,
    rules: &[
        SliceRule::required(Field::Amount, "withdrawn", Boundary::UntilOrEnd("RWF")),
        SliceRule::required(Field::Name, "You", Boundary::Until("withdrawn")).words(1),
        NEW_BALANCE,
    ],
    fixed_name: None,
};

/// Slice rules for a category; Other has none
pub fn layout(category: TransactionCategory) -> Option<&'static CategoryLayout> {
    match category {
        TransactionCategory::Incoming => Some(&INCOMING),
        TransactionCategory::Payment => Some(&PAYMENT),
        TransactionCategory::Transfer => Some(&TRANSFER),
        TransactionCategory::BankDeposit => Some(&BANK_DEPOSIT),
        TransactionCategory::Withdrawal => Some(&WITHDRAWAL),
        TransactionCategory::Other => None,
    }
}

// ============================================================================
// EXTRACTION
// ============================================================================

/// Run every rule of the category against the body.
///
/// Optional fields whose marker is missing keep their default. A required
/// field that cannot be sliced or parsed fails the whole extraction.
pub fn extract(body: &str, category: TransactionCategory) -> Result<ExtractedFields, ExtractionError> {
    let mut fields = ExtractedFields::unknown();

    let layout = match layout(category) {
        Some(layout) => layout,
        None => return Ok(fields),
    };

    fields.category = layout.category;
    if let Some(name) = layout.fixed_name {
        fields.counterparty_name = name.to_string();
    }

    for rule in layout.rules {
        if let Err(error) = rule.apply(body, &mut fields) {
            if rule.required {
                return Err(error);
            }
            if rule.markers_present(body) {
                tracing::debug!(
                    category = %category,
                    field = ?rule.field,
                    "Keeping default for optional field: {}",
                    error
                );
            }
        }
    }

    Ok(fields)
}

/// Like `extract`, but logs the failure and hands back the default fields
pub fn extract_or_default(body: &str, category: TransactionCategory) -> ExtractedFields {
    extract(body, category).unwrap_or_else(|error| {
        tracing::warn!(category = %category, body = %body, "Error parsing message: {}", error);
        ExtractedFields::unknown()
    })
}

// ============================================================================
// TESTS
// ============================================================================
