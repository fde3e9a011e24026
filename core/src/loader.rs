//! Record loader, stage 1 of the pipeline.
//!
//! Reads the relation source and the four extracts, builds the
//! person↔account KeyMap, and attaches the missing key to every
//! record. Records whose key cannot be resolved are dropped here,
//! before anything downstream sees them.

use crate::{
    config::PipelineConfig,
    error::{PipelineError, PipelineResult},
    event::PipelineEvent,
    stage::PipelineStage,
    types::{AccountKey, PersonKey, SourceKind},
};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

// ── KeyMap ───────────────────────────────────────────────────────────────────

/// One-to-one person↔account mapping. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct KeyMap {
    pairs: Vec<(PersonKey, AccountKey)>,
    by_account: HashMap<AccountKey, PersonKey>,
    by_person: HashMap<PersonKey, AccountKey>,
}

impl KeyMap {
    /// Dedup by account key (first wins), then by person key (first wins).
    ///
    /// Rows with a missing key take part in both passes like any other
    /// value, so a leading row with an empty person key still claims its
    /// account key. Pairs with a missing key are discarded afterwards.
    pub fn build<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (Option<PersonKey>, Option<AccountKey>)>,
    {
        let mut seen_accounts = HashSet::new();
        let by_account_first: Vec<_> = rows
            .into_iter()
            .filter(|(_, account)| seen_accounts.insert(account.clone()))
            .collect();

        let mut seen_persons = HashSet::new();
        let pairs: Vec<(PersonKey, AccountKey)> = by_account_first
            .into_iter()
            .filter(|(person, _)| seen_persons.insert(person.clone()))
            .filter_map(|(person, account)| Some((person?, account?)))
            .collect();

        let by_account = pairs
            .iter()
            .map(|(p, a)| (a.clone(), p.clone()))
            .collect();
        let by_person = pairs
            .iter()
            .map(|(p, a)| (p.clone(), a.clone()))
            .collect();

        Self { pairs, by_account, by_person }
    }

    pub fn person_for(&self, account_key: &str) -> Option<&PersonKey> {
        self.by_account.get(account_key)
    }

    pub fn account_for(&self, person_key: &str) -> Option<&AccountKey> {
        self.by_person.get(person_key)
    }

    /// Pairs in relation-source order.
    pub fn pairs(&self) -> &[(PersonKey, AccountKey)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

// ── Resolved records ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct AccountRecord {
    pub account_key: AccountKey,
    pub person_key: PersonKey,
    pub base_interest_rate: Option<f64>,
    pub repay_frequency: Option<f64>,
    pub number_of_total_installments: Option<f64>,
    pub delay_days: Option<f64>,
    pub overdue_expenses: Option<f64>,
    pub total_balance: Option<f64>,
    pub collateral_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepositRecord {
    pub person_key: PersonKey,
    pub account_key: AccountKey,
    pub accounting_balance: Option<f64>,
    pub available_balance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub account_key: AccountKey,
    pub person_key: PersonKey,
    pub capital_amount: Option<f64>,
    pub payinterest: Option<f64>,
    pub payexpenses: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonRecord {
    pub person_key: PersonKey,
    pub account_key: AccountKey,
    pub marital_status: Option<String>,
    pub gender: Option<String>,
}

/// Output of the loader: four record sets, each carrying both keys.
#[derive(Debug, Clone, Default)]
pub struct LoadedSources {
    pub key_map: KeyMap,
    pub accounts: Vec<AccountRecord>,
    pub deposits: Vec<DepositRecord>,
    pub payments: Vec<PaymentRecord>,
    pub persons: Vec<PersonRecord>,
}

// ── Raw CSV rows ─────────────────────────────────────────────────────────────

trait SourceRow: DeserializeOwned {
    const KIND: SourceKind;
    const COLUMNS: &'static [&'static str];

    /// Numeric cells by column name.
    fn numbers(&self) -> Vec<(&'static str, Option<f64>)> {
        Vec::new()
    }
}

/// Cells read as missing, the same markers pandas' `read_csv` uses.
pub const NA_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub fn is_na(cell: &str) -> bool {
    cell.is_empty() || NA_TOKENS.contains(&cell)
}

fn na_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let cell = Option::<String>::deserialize(deserializer)?;
    Ok(cell.filter(|c| !is_na(c)))
}

fn na_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match na_text(deserializer)? {
        None => Ok(None),
        Some(cell) => cell
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid number '{cell}'"))),
    }
}

#[derive(Debug, Deserialize)]
struct RelationRow {
    #[serde(deserialize_with = "na_text")]
    person_key: Option<PersonKey>,
    #[serde(deserialize_with = "na_text")]
    account_key: Option<AccountKey>,
}

impl SourceRow for RelationRow {
    const KIND: SourceKind = SourceKind::Relation;
    const COLUMNS: &'static [&'static str] = &["person_key", "account_key"];
}

#[derive(Debug, Deserialize)]
struct AccountRow {
    #[serde(deserialize_with = "na_text")]
    account_key: Option<AccountKey>,
    #[serde(deserialize_with = "na_number")]
    base_interest_rate: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    repay_frequency: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    number_of_total_installments: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    delay_days: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    overdue_expenses: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    total_balance: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    collateral_amount: Option<f64>,
}

impl SourceRow for AccountRow {
    const KIND: SourceKind = SourceKind::Account;
    const COLUMNS: &'static [&'static str] = &[
        "account_key",
        "base_interest_rate",
        "repay_frequency",
        "number_of_total_installments",
        "delay_days",
        "overdue_expenses",
        "total_balance",
        "collateral_amount",
    ];

    fn numbers(&self) -> Vec<(&'static str, Option<f64>)> {
        vec![
            ("base_interest_rate", self.base_interest_rate),
            ("repay_frequency", self.repay_frequency),
            ("number_of_total_installments", self.number_of_total_installments),
            ("delay_days", self.delay_days),
            ("overdue_expenses", self.overdue_expenses),
            ("total_balance", self.total_balance),
            ("collateral_amount", self.collateral_amount),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct DepositRow {
    #[serde(deserialize_with = "na_text")]
    person_key: Option<PersonKey>,
    #[serde(deserialize_with = "na_number")]
    accounting_balance: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    available_balance: Option<f64>,
}

impl SourceRow for DepositRow {
    const KIND: SourceKind = SourceKind::Deposit;
    const COLUMNS: &'static [&'static str] =
        &["person_key", "accounting_balance", "available_balance"];

    fn numbers(&self) -> Vec<(&'static str, Option<f64>)> {
        vec![
            ("accounting_balance", self.accounting_balance),
            ("available_balance", self.available_balance),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct PaymentRow {
    #[serde(deserialize_with = "na_text")]
    account_key: Option<AccountKey>,
    #[serde(deserialize_with = "na_number")]
    capital_amount: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    payinterest: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    payexpenses: Option<f64>,
}

impl SourceRow for PaymentRow {
    const KIND: SourceKind = SourceKind::Payment;
    const COLUMNS: &'static [&'static str] =
        &["account_key", "capital_amount", "payinterest", "payexpenses"];

    fn numbers(&self) -> Vec<(&'static str, Option<f64>)> {
        vec![
            ("capital_amount", self.capital_amount),
            ("payinterest", self.payinterest),
            ("payexpenses", self.payexpenses),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct PersonRow {
    #[serde(deserialize_with = "na_text")]
    person_key: Option<PersonKey>,
    #[serde(deserialize_with = "na_text")]
    marital_status: Option<String>,
    #[serde(deserialize_with = "na_text")]
    gender: Option<String>,
}

impl SourceRow for PersonRow {
    const KIND: SourceKind = SourceKind::Person;
    const COLUMNS: &'static [&'static str] = &["person_key", "marital_status", "gender"];
}

/// Read one source, checking its header before any row is parsed.
fn read_source<R: SourceRow>(path: &Path) -> PipelineResult<Vec<R>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::MissingSource {
            kind: R::KIND,
            path: path.to_path_buf(),
        },
        _ => PipelineError::Io(e),
    })?;
    parse_source(BufReader::new(file))
}

fn parse_source<R: SourceRow>(input: impl Read) -> PipelineResult<Vec<R>> {
    let csv_error = |error: csv::Error| PipelineError::Csv { kind: R::KIND, error };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader.headers().map_err(csv_error)?.clone();
    if let Some(column) = R::COLUMNS
        .iter()
        .find(|column| !headers.iter().any(|h| h == **column))
    {
        return Err(PipelineError::SchemaMismatch {
            kind: R::KIND,
            column: column.to_string(),
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let row: R = record.deserialize(Some(&headers)).map_err(csv_error)?;
        if let Some((column, value)) = row
            .numbers()
            .into_iter()
            .find_map(|(column, value)| value.filter(|v| !v.is_finite()).map(|v| (column, v)))
        {
            return Err(PipelineError::NonFinite {
                kind: R::KIND,
                column,
                line: record.position().map(|p| p.line()),
                value,
            });
        }
        rows.push(row);
    }
    Ok(rows)
}

fn note_drops(kind: SourceKind, rows_read: usize, rows_kept: usize, events: &mut Vec<PipelineEvent>) {
    let dropped = rows_read - rows_kept;
    if dropped > 0 {
        log::warn!("loader: {kind}: dropped {dropped} of {rows_read} rows with no resolvable key");
    }
    log::info!("loader: {kind}: kept {rows_kept} rows");
    events.push(PipelineEvent::SourceLoaded {
        source: kind,
        rows_read,
        rows_kept,
    });
}

// ── Stage ────────────────────────────────────────────────────────────────────

pub struct RecordLoader<'a> {
    config: &'a PipelineConfig,
}

impl<'a> RecordLoader<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Every source must exist before any of them is parsed.
    fn check_sources_present(&self) -> PipelineResult<()> {
        for kind in SourceKind::ALL {
            let path = self.config.source_path(kind);
            if !path.is_file() {
                return Err(PipelineError::MissingSource { kind, path });
            }
        }
        Ok(())
    }

    fn load_key_map(&self, events: &mut Vec<PipelineEvent>) -> PipelineResult<KeyMap> {
        let rows: Vec<RelationRow> =
            read_source(&self.config.source_path(SourceKind::Relation))?;
        let relation_rows = rows.len();
        let key_map = KeyMap::build(rows.into_iter().map(|r| (r.person_key, r.account_key)));

        log::info!(
            "loader: relation: {relation_rows} rows -> {} person/account pairs",
            key_map.len()
        );
        events.push(PipelineEvent::KeyMapBuilt {
            relation_rows,
            pairs: key_map.len(),
        });
        Ok(key_map)
    }

    fn load_accounts(
        &self,
        key_map: &KeyMap,
        events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<Vec<AccountRecord>> {
        let rows: Vec<AccountRow> = read_source(&self.config.source_path(SourceKind::Account))?;
        let rows_read = rows.len();
        let records: Vec<AccountRecord> = rows
            .into_iter()
            .filter_map(|r| {
                let account_key = r.account_key?;
                let person_key = key_map.person_for(&account_key)?.clone();
                Some(AccountRecord {
                    account_key,
                    person_key,
                    base_interest_rate: r.base_interest_rate,
                    repay_frequency: r.repay_frequency,
                    number_of_total_installments: r.number_of_total_installments,
                    delay_days: r.delay_days,
                    overdue_expenses: r.overdue_expenses,
                    total_balance: r.total_balance,
                    collateral_amount: r.collateral_amount,
                })
            })
            .collect();
        note_drops(SourceKind::Account, rows_read, records.len(), events);
        Ok(records)
    }

    fn load_deposits(
        &self,
        key_map: &KeyMap,
        events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<Vec<DepositRecord>> {
        let rows: Vec<DepositRow> = read_source(&self.config.source_path(SourceKind::Deposit))?;
        let rows_read = rows.len();
        let records: Vec<DepositRecord> = rows
            .into_iter()
            .filter_map(|r| {
                let person_key = r.person_key?;
                let account_key = key_map.account_for(&person_key)?.clone();
                Some(DepositRecord {
                    person_key,
                    account_key,
                    accounting_balance: r.accounting_balance,
                    available_balance: r.available_balance,
                })
            })
            .collect();
        note_drops(SourceKind::Deposit, rows_read, records.len(), events);
        Ok(records)
    }

    fn load_payments(
        &self,
        key_map: &KeyMap,
        events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<Vec<PaymentRecord>> {
        let rows: Vec<PaymentRow> = read_source(&self.config.source_path(SourceKind::Payment))?;
        let rows_read = rows.len();
        let records: Vec<PaymentRecord> = rows
            .into_iter()
            .filter_map(|r| {
                let account_key = r.account_key?;
                let person_key = key_map.person_for(&account_key)?.clone();
                Some(PaymentRecord {
                    account_key,
                    person_key,
                    capital_amount: r.capital_amount,
                    payinterest: r.payinterest,
                    payexpenses: r.payexpenses,
                })
            })
            .collect();
        note_drops(SourceKind::Payment, rows_read, records.len(), events);
        Ok(records)
    }

    fn load_persons(
        &self,
        key_map: &KeyMap,
        events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<Vec<PersonRecord>> {
        let rows: Vec<PersonRow> = read_source(&self.config.source_path(SourceKind::Person))?;
        let rows_read = rows.len();
        let records: Vec<PersonRecord> = rows
            .into_iter()
            .filter_map(|r| {
                let person_key = r.person_key?;
                let account_key = key_map.account_for(&person_key)?.clone();
                Some(PersonRecord {
                    person_key,
                    account_key,
                    marital_status: r.marital_status,
                    gender: r.gender,
                })
            })
            .collect();
        note_drops(SourceKind::Person, rows_read, records.len(), events);
        Ok(records)
    }
}

impl PipelineStage for RecordLoader<'_> {
    type Input = ();
    type Output = LoadedSources;

    fn name(&self) -> &'static str {
        "record_loader"
    }

    fn run(&self, _input: (), events: &mut Vec<PipelineEvent>) -> PipelineResult<LoadedSources> {
        self.check_sources_present()?;

        let key_map = self.load_key_map(events)?;
        let accounts = self.load_accounts(&key_map, events)?;
        let deposits = self.load_deposits(&key_map, events)?;
        let payments = self.load_payments(&key_map, events)?;
        let persons = self.load_persons(&key_map, events)?;

        Ok(LoadedSources {
            key_map,
            accounts,
            deposits,
            payments,
            persons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(p: &str, a: &str) -> (Option<PersonKey>, Option<AccountKey>) {
        (Some(p.to_string()), Some(a.to_string()))
    }

    #[test]
    fn account_dedup_runs_before_person_dedup() {
        // p1 claims a1; p1's second row is then dropped by person dedup,
        // and p2's row for a1 was already dropped by account dedup.
        let map = KeyMap::build(vec![
            pair("p1", "a1"),
            pair("p2", "a1"),
            pair("p1", "a2"),
            pair("p3", "a3"),
        ]);
        assert_eq!(
            map.pairs(),
            &[
                ("p1".to_string(), "a1".to_string()),
                ("p3".to_string(), "a3".to_string()),
            ]
        );
        assert_eq!(map.account_for("p2"), None);
        assert_eq!(map.person_for("a2"), None);
    }

    #[test]
    fn keys_are_unique_after_build() {
        let rows: Vec<_> = (0..40)
            .map(|i| pair(&format!("p{}", i % 7), &format!("a{}", i % 11)))
            .collect();
        let map = KeyMap::build(rows);

        let persons: HashSet<_> = map.pairs().iter().map(|(p, _)| p).collect();
        let accounts: HashSet<_> = map.pairs().iter().map(|(_, a)| a).collect();
        assert_eq!(persons.len(), map.len());
        assert_eq!(accounts.len(), map.len());
    }

    #[test]
    fn missing_person_key_still_claims_its_account() {
        let map = KeyMap::build(vec![
            (None, Some("a1".to_string())),
            pair("p1", "a1"),
            pair("p2", "a2"),
        ]);
        assert_eq!(map.person_for("a1"), None);
        assert_eq!(map.account_for("p2").map(String::as_str), Some("a2"));
        assert_eq!(map.len(), 1);
    }

    const ACCOUNT_HEADER: &str = "account_key,base_interest_rate,repay_frequency,\
number_of_total_installments,delay_days,overdue_expenses,total_balance,collateral_amount";

    #[test]
    fn na_markers_read_as_missing() {
        let csv = format!("{ACCOUNT_HEADER}\na1,NaN,nan,NA,null,,N/A,<NA>\n");
        let rows: Vec<AccountRow> = parse_source(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].account_key.as_deref(), Some("a1"));
        assert!(rows[0].numbers().iter().all(|(_, v)| v.is_none()));

        let rows: Vec<PersonRow> =
            parse_source("person_key,marital_status,gender\np1,None, NULL \n".as_bytes()).unwrap();
        assert_eq!(rows[0].marital_status, None);
        assert_eq!(rows[0].gender, None);

        let rows: Vec<RelationRow> =
            parse_source("person_key,account_key\nNA,a1\n".as_bytes()).unwrap();
        assert_eq!(rows[0].person_key, None);
    }

    #[test]
    fn infinite_cell_is_rejected_with_its_column() {
        let csv = format!("{ACCOUNT_HEADER}\na1,0.04,12,24,10,1,100,5\na2,0.04,12,24,inf,1,100,5\n");
        let err = parse_source::<AccountRow>(csv.as_bytes()).unwrap_err();
        match err {
            PipelineError::NonFinite { kind, column, line, value } => {
                assert_eq!(kind, SourceKind::Account);
                assert_eq!(column, "delay_days");
                assert_eq!(line, Some(3));
                assert!(value.is_infinite());
            }
            other => panic!("expected NonFinite, got {other}"),
        }

        let err = parse_source::<DepositRow>(
            "person_key,accounting_balance,available_balance\np1,1,-inf\n".as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NonFinite { kind: SourceKind::Deposit, column: "available_balance", .. }
        ));
    }

    #[test]
    fn unparsable_number_is_a_csv_error() {
        let csv = format!("{ACCOUNT_HEADER}\na1,0.04,monthly,24,10,1,100,5\n");
        let err = parse_source::<AccountRow>(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, PipelineError::Csv { kind: SourceKind::Account, .. }));
        assert!(err.to_string().contains("invalid number 'monthly'"), "{err}");
    }
}
