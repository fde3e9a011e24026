//! CSV fixtures shared by the integration tests.

#![allow(dead_code)]

use riskpipe_core::{config::OutputPaths, PipelineConfig};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const RELATION: &str = "ca_relation_typed.csv";
pub const ACCOUNT: &str = "account_typed.csv";
pub const DEPOSIT: &str = "deposit_account_typed.csv";
pub const PAYMENT: &str = "payment_typed.csv";
pub const PERSON: &str = "person_typed.csv";

pub const ACCOUNT_HEADER: &str = "account_key,base_interest_rate,repay_frequency,\
number_of_total_installments,delay_days,overdue_expenses,total_balance,collateral_amount";

/// A temp directory holding one set of sources plus an output dir.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            dir: TempDir::new().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, contents: &str) {
        std::fs::write(self.path().join(name), contents).expect("write fixture");
    }

    pub fn remove(&self, name: &str) {
        std::fs::remove_file(self.path().join(name)).expect("remove fixture");
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join("out")
    }

    /// Config reading from this fixture, writing into `out/`.
    pub fn config(&self) -> PipelineConfig {
        PipelineConfig::new(self.path()).with_output(OutputPaths::in_dir(self.output_dir()))
    }

    /// Config with a small forest, for tests that only need a model.
    pub fn quick_config(&self) -> PipelineConfig {
        self.config().with_trees(20)
    }
}

/// A realistic batch of `n` accounts.
///
/// Every fourth account is badly delinquent (raw delay 400, the batch
/// maximum) and carries proportionally large overdue expenses; the rest
/// sit well below the label threshold. A few rows exercise the drop and
/// fill paths: an account and a deposit with no relation entry, some
/// persons without deposits, and blank categorical cells.
pub fn write_synthetic_sources(fixture: &Fixture, n: usize) {
    let mut relation = String::from("person_key,account_key\n");
    for i in 0..n {
        writeln!(relation, "p{i},a{i}").unwrap();
    }
    // Later duplicates lose to the first occurrence.
    writeln!(relation, "p0,a1").unwrap();
    writeln!(relation, "p2,a0").unwrap();
    fixture.write(RELATION, &relation);

    let mut account = format!("{ACCOUNT_HEADER}\n");
    for i in 0..n {
        let delay = delay_for(i);
        let collateral = if i % 6 == 0 { String::new() } else { "500".to_string() };
        writeln!(
            account,
            "a{i},{:.3},{},{},{delay},{},{},{collateral}",
            0.03 + (i % 7) as f64 * 0.005,
            1 + i % 3,
            12 * (1 + i % 4),
            delay * 2 + (i % 5) as u32,
            1000 + (i * 53) % 900,
        )
        .unwrap();
    }
    writeln!(account, "a_orphan,0.05,1,12,10,0,100,0").unwrap();
    fixture.write(ACCOUNT, &account);

    let mut deposit = String::from("person_key,accounting_balance,available_balance\n");
    for i in (0..n).filter(|i| i % 10 != 3) {
        writeln!(deposit, "p{i},{},{}", 200 + (i * 31) % 700, 150 + (i * 17) % 500).unwrap();
    }
    writeln!(deposit, "p_unknown,1,1").unwrap();
    fixture.write(DEPOSIT, &deposit);

    let mut payment = String::from("account_key,capital_amount,payinterest,payexpenses\n");
    for i in 0..n {
        writeln!(payment, "a{i},{},{},{}", 100 + (i * 13) % 400, 5 + i % 20, i % 4).unwrap();
    }
    fixture.write(PAYMENT, &payment);

    let mut person = String::from("person_key,marital_status,gender\n");
    for i in 0..n {
        let marital = if i % 11 == 0 { "" } else { ["single", "married", "divorced"][i % 3] };
        let gender = if i % 2 == 0 { "F" } else { "M" };
        writeln!(person, "p{i},{marital},{gender}").unwrap();
    }
    fixture.write(PERSON, &person);
}

pub fn delay_for(i: usize) -> u32 {
    match i {
        1 => 0,
        _ if i % 4 == 0 => 400,
        _ => ((i * 37) % 200) as u32,
    }
}

/// Three fully populated accounts with delays 0, 100 and 200.
pub fn write_three_account_sources(fixture: &Fixture) {
    fixture.write(RELATION, "person_key,account_key\npA,A\npB,B\npC,C\n");
    fixture.write(
        ACCOUNT,
        &format!(
            "{ACCOUNT_HEADER}\n\
             A,0.04,12,24,0,0,1000,100\n\
             B,0.05,12,36,100,50,2000,200\n\
             C,0.06,6,48,200,90,3000,300\n"
        ),
    );
    fixture.write(
        DEPOSIT,
        "person_key,accounting_balance,available_balance\npA,10,9\npB,20,19\npC,30,29\n",
    );
    fixture.write(
        PAYMENT,
        "account_key,capital_amount,payinterest,payexpenses\nA,1,2,3\nB,4,5,6\nC,7,8,9\n",
    );
    fixture.write(
        PERSON,
        "person_key,marital_status,gender\npA,single,F\npB,married,M\npC,single,M\n",
    );
}
