use crate::error::{LedgerError, Result};
use crate::utils::{capitalize, month_name, month_number, parse_period_string};
use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Fill value for descriptive dimensions that are null, blank or absent.
pub const DEFAULT_SENTINEL: &str = "Não informado";

/// Classification of a movement. Anything that is neither revenue nor expense
/// after normalization is carried as `Other` with its normalized text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum MovementKind {
    Revenue,
    Expense,
    Other(String),
}

impl MovementKind {
    /// Trims and capitalizes `raw`, then maps the Portuguese and English labels.
    pub fn parse(raw: &str) -> Self {
        let normalized = capitalize(raw);
        match normalized.as_str() {
            "Receita" | "Revenue" => MovementKind::Revenue,
            "Despesa" | "Expense" => MovementKind::Expense,
            _ => MovementKind::Other(normalized),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            MovementKind::Revenue => "Revenue",
            MovementKind::Expense => "Expense",
            MovementKind::Other(label) => label,
        }
    }

    /// Whether the kind takes part in net-result (Revenue + Expense) math.
    pub fn is_net_component(&self) -> bool {
        matches!(self, MovementKind::Revenue | MovementKind::Expense)
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for MovementKind {
    fn from(value: String) -> Self {
        MovementKind::parse(&value)
    }
}

impl From<MovementKind> for String {
    fn from(value: MovementKind) -> Self {
        value.label().to_string()
    }
}

/// A calendar month, ordered January to December and labelled with the fixed
/// month-name table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CalendarMonth(u32);

impl CalendarMonth {
    pub fn new(number: u32) -> Option<Self> {
        (1..=12).contains(&number).then_some(Self(number))
    }

    pub fn from_name(name: &str) -> Result<Self> {
        month_number(name)
            .map(Self)
            .ok_or_else(|| LedgerError::UnknownMonth(name.to_string()))
    }

    pub fn number(&self) -> u32 {
        self.0
    }

    pub fn name(&self) -> &'static str {
        month_name(self.0).unwrap_or_default()
    }
}

impl fmt::Display for CalendarMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<String> for CalendarMonth {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_name(&value)
    }
}

impl From<CalendarMonth> for String {
    fn from(value: CalendarMonth) -> Self {
        value.name().to_string()
    }
}

/// Year-month compound key, displayed as `YYYY-MM` and ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PeriodKey {
    pub year: i32,
    pub month: CalendarMonth,
}

impl PeriodKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: CalendarMonth(date.month()),
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month.number())
    }
}

impl FromStr for PeriodKey {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let (year, month) = parse_period_string(s)?;
        Ok(Self {
            year,
            month: CalendarMonth(month),
        })
    }
}

impl TryFrom<String> for PeriodKey {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PeriodKey> for String {
    fn from(value: PeriodKey) -> Self {
        value.to_string()
    }
}

/// A normalized movement. Descriptive dimensions are never empty and the
/// calendar fields are always derived from `posting_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub entity: String,
    pub group: String,
    pub branch: String,
    pub account_type: String,
    pub account_code: String,
    pub movement_kind: MovementKind,
    pub amount: f64,
    pub posting_date: NaiveDate,
    pub year: i32,
    pub month: CalendarMonth,
    pub period_key: PeriodKey,
}

impl MovementRecord {
    /// Creates a record with every descriptive dimension set to [`DEFAULT_SENTINEL`].
    pub fn new(movement_kind: MovementKind, amount: f64, posting_date: NaiveDate) -> Self {
        let period_key = PeriodKey::from_date(posting_date);
        Self {
            entity: DEFAULT_SENTINEL.to_string(),
            group: DEFAULT_SENTINEL.to_string(),
            branch: DEFAULT_SENTINEL.to_string(),
            account_type: DEFAULT_SENTINEL.to_string(),
            account_code: DEFAULT_SENTINEL.to_string(),
            movement_kind,
            amount,
            posting_date,
            year: period_key.year,
            month: period_key.month,
            period_key,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_account_type(mut self, account_type: impl Into<String>) -> Self {
        self.account_type = account_type.into();
        self
    }

    pub fn with_account_code(mut self, account_code: impl Into<String>) -> Self {
        self.account_code = account_code.into();
        self
    }

    pub fn month_name(&self) -> &'static str {
        self.month.name()
    }
}

/// A column a record set can be grouped, pivoted or filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Year,
    Month,
    Period,
    Entity,
    Group,
    Branch,
    MovementKind,
    AccountType,
    AccountCode,
}

impl Dimension {
    pub fn column_name(&self) -> &'static str {
        match self {
            Dimension::Year => "year",
            Dimension::Month => "month_name",
            Dimension::Period => "period",
            Dimension::Entity => "entity",
            Dimension::Group => "group",
            Dimension::Branch => "branch",
            Dimension::MovementKind => "movement_kind",
            Dimension::AccountType => "account_type",
            Dimension::AccountCode => "account_code",
        }
    }

    pub fn key_of(&self, record: &MovementRecord) -> KeyValue {
        match self {
            Dimension::Year => KeyValue::Year(record.year),
            Dimension::Month => KeyValue::Month(record.month),
            Dimension::Period => KeyValue::Period(record.period_key),
            Dimension::Entity => KeyValue::Text(record.entity.clone()),
            Dimension::Group => KeyValue::Text(record.group.clone()),
            Dimension::Branch => KeyValue::Text(record.branch.clone()),
            Dimension::MovementKind => KeyValue::Kind(record.movement_kind.clone()),
            Dimension::AccountType => KeyValue::Text(record.account_type.clone()),
            Dimension::AccountCode => KeyValue::Text(record.account_code.clone()),
        }
    }
}

/// One cell of a grouping key. Months and periods order chronologically,
/// text orders lexically and kinds follow statement order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    Year(i32),
    Month(CalendarMonth),
    Period(PeriodKey),
    Kind(MovementKind),
    Text(String),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Year(year) => write!(f, "{}", year),
            KeyValue::Month(month) => write!(f, "{}", month),
            KeyValue::Period(period) => write!(f, "{}", period),
            KeyValue::Kind(kind) => write!(f, "{}", kind),
            KeyValue::Text(text) => f.write_str(text),
        }
    }
}

impl KeyValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            KeyValue::Year(year) => serde_json::Value::from(*year),
            other => serde_json::Value::String(other.to_string()),
        }
    }
}

impl Serialize for KeyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            KeyValue::Year(year) => serializer.serialize_i32(*year),
            other => serializer.collect_str(other),
        }
    }
}

/// Which time dimension becomes the columns of a time pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimeAxis {
    /// Calendar month names; the same month of different years shares a column.
    #[default]
    Month,
    /// One column per `YYYY-MM` period.
    Period,
}

impl TimeAxis {
    pub fn dimension(&self) -> Dimension {
        match self {
            TimeAxis::Month => Dimension::Month,
            TimeAxis::Period => Dimension::Period,
        }
    }
}

/// What the normalizer does with movement kinds other than revenue or expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKindPolicy {
    #[schemars(description = "Exclude the record from every downstream computation.")]
    #[default]
    Drop,

    #[schemars(
        description = "Keep the record as its own movement kind. It appears in raw groupings but never in net-result math."
    )]
    Keep,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FieldMapping {
    #[schemars(description = "Source field holding the entity (holding / razão).")]
    pub entity: String,
    #[schemars(description = "Source field holding the group.")]
    pub group: String,
    #[schemars(description = "Source field holding the branch (filial).")]
    pub branch: String,
    #[schemars(description = "Legacy field read as the branch when the canonical one is absent.")]
    pub legacy_branch: Option<String>,
    #[schemars(description = "Source field holding the account type.")]
    pub account_type: String,
    #[schemars(description = "Source field holding the account code (plano de contas).")]
    pub account_code: String,
    #[schemars(description = "Source field holding the movement kind (Receita / Despesa).")]
    pub movement_kind: String,
    #[schemars(description = "Source field holding the signed amount, as number or numeric string.")]
    pub amount: String,
    #[schemars(description = "Source field holding the posting date.")]
    pub posting_date: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            entity: "razao".to_string(),
            group: "grupo".to_string(),
            branch: "filial".to_string(),
            legacy_branch: Some("fornecedor".to_string()),
            account_type: "tipo_conta".to_string(),
            account_code: "pcontas".to_string(),
            movement_kind: "movimento".to_string(),
            amount: "valor".to_string(),
            posting_date: "dt_lancamento".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LedgerConfig {
    #[schemars(description = "Names of the raw source fields.")]
    pub fields: FieldMapping,

    #[schemars(description = "Value substituted for missing descriptive dimensions.")]
    pub sentinel: String,

    #[schemars(
        description = "Extra chrono formats tried for posting dates after YYYY-MM-DD and RFC 3339."
    )]
    pub date_formats: Vec<String>,

    #[schemars(description = "Handling of movement kinds other than Receita / Despesa.")]
    pub unknown_kinds: UnknownKindPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fields: FieldMapping::default(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            date_formats: vec![
                "%Y-%m-%dT%H:%M:%S%.f".to_string(),
                "%Y-%m-%d %H:%M:%S%.f".to_string(),
                "%Y-%m-%d %H:%M:%S%.f%#z".to_string(),
                "%d/%m/%Y".to_string(),
            ],
            unknown_kinds: UnknownKindPolicy::default(),
        }
    }
}

impl LedgerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sentinel.trim().is_empty() {
            return Err(LedgerError::InvalidConfig(
                "sentinel must not be blank".to_string(),
            ));
        }

        let fields = &self.fields;
        let required = [
            ("entity", &fields.entity),
            ("group", &fields.group),
            ("branch", &fields.branch),
            ("account_type", &fields.account_type),
            ("account_code", &fields.account_code),
            ("movement_kind", &fields.movement_kind),
            ("amount", &fields.amount),
            ("posting_date", &fields.posting_date),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(LedgerError::InvalidConfig(format!(
                    "field mapping for '{}' must not be blank",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(LedgerConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
