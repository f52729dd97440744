//! Whole-model scenarios run through the library API.

use chrono::NaiveDate;
use fincast::core::{
    digest, generate, read_model_json, run, Asset, EngineError, Income, Interval, Model,
    Projection, RunConfig, Transaction, Trigger,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fs::File;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn fixture(name: &str) -> Model {
    let path = format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), name);
    read_model_json(File::open(path).unwrap()).unwrap()
}

fn config(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> RunConfig {
    RunConfig {
        interval: Interval::new(start, end),
        today,
    }
}

fn value_of(projection: &Projection, name: &str) -> Decimal {
    projection
        .evaluations
        .iter()
        .rev()
        .find(|e| e.name == name)
        .map(|e| e.value)
        .unwrap_or_else(|| panic!("no evaluation for {}", name))
}

#[test]
fn same_model_projects_identically() {
    let model = fixture("household.json");
    let config = config(date(2019, 1, 1), date(2022, 1, 1), date(2020, 6, 1));

    let first = run(&model, &config);
    let second = run(&model, &config);

    assert_eq!(first.evaluations, second.evaluations);
    assert_eq!(first.today, second.today);
    assert_eq!(
        digest(&first.evaluations).unwrap(),
        digest(&second.evaluations).unwrap()
    );
}

#[test]
fn household_projects_without_warnings() {
    let model = fixture("household.json");
    let projection = run(
        &model,
        &config(date(2019, 1, 1), date(2022, 1, 1), date(2020, 6, 1)),
    );

    assert!(projection.warnings.is_empty(), "{:?}", projection.warnings);
    // ledger is date ordered
    assert!(projection
        .evaluations
        .windows(2)
        .all(|pair| pair[0].date <= pair[1].date));
    // tax years ending 2019, 2020 and 2021 settle inside the interval
    let settlements = projection
        .evaluations
        .iter()
        .filter(|e| e.name == "Joe income (incomeTax)")
        .count();
    assert_eq!(settlements, 3);
    assert!(projection.today.debts.contains_key("Mortgage"));
    assert!(!projection.today.settings.contains_key("chartYears"));
}

#[test]
fn cyclic_triggers_fail_to_resolve() {
    let model = Model {
        triggers: vec![
            Trigger {
                name: "a".into(),
                date: "b+1m".into(),
            },
            Trigger {
                name: "b".into(),
                date: "a".into(),
            },
        ],
        ..Default::default()
    };
    let resolver = fincast::core::date_resolver(&model);
    assert!(matches!(
        resolver.resolve("a"),
        Err(EngineError::InvalidDate { .. })
    ));
}

#[test]
fn broken_model_warns_per_unusable_item() {
    let model = fixture("broken.json");
    let projection = run(
        &model,
        &config(date(2019, 1, 1), date(2019, 3, 1), date(2019, 1, 1)),
    );

    let items: Vec<_> = projection.warnings.iter().map(|w| w.item()).collect();
    assert_eq!(items, vec!["Boat", "Art"]);
    assert_eq!(value_of(&projection, "Cash"), dec!(100));
}

#[test]
fn recurrence_stays_inside_the_interval() {
    let interval = Interval::new(date(2019, 1, 31), date(2019, 12, 31));
    let dates: Vec<_> = generate(interval, "1m".parse().unwrap()).collect();

    assert_eq!(dates.len(), 11);
    assert_eq!(dates[0], date(2019, 1, 31));
    assert!(dates.iter().all(|d| interval.contains(*d)));
    assert!(dates.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn liquidation_covers_negative_cash() {
    let model = fixture("liquidation.json");
    let projection = run(
        &model,
        &config(date(2019, 1, 1), date(2019, 2, 1), date(2019, 1, 1)),
    );

    assert!(projection.warnings.is_empty());
    assert_eq!(value_of(&projection, "Stf"), dec!(172));
    assert_eq!(value_of(&projection, "Cash"), dec!(45));
}

#[test]
fn single_large_payment_is_taxed_at_year_end() {
    let model = fixture("salary.json");
    let projection = run(
        &model,
        &config(date(2019, 4, 6), date(2020, 4, 6), date(2019, 6, 1)),
    );

    assert_eq!(projection.today.assets["Cash"], dec!(150100));
    assert_eq!(value_of(&projection, "Joe income (incomeTax)"), dec!(50045.00));
    assert_eq!(value_of(&projection, "Joe income (net)"), dec!(100055.00));
    assert_eq!(value_of(&projection, "Cash"), dec!(100055.00));

    let settled = projection
        .evaluations
        .iter()
        .find(|e| e.name == "Joe income (incomeTax)")
        .unwrap();
    assert_eq!(settled.date, date(2020, 4, 5));
}

#[test]
fn partial_disposal_charges_capital_gains() {
    let model = Model {
        assets: vec![
            Asset {
                name: "Cash".into(),
                start: "2019-04-06".into(),
                value: "0".into(),
                ..Default::default()
            },
            Asset {
                name: "Shares".into(),
                start: "2019-04-06".into(),
                value: "300000".into(),
                liability: "Joe(CGT)".into(),
                purchase_price: "50000".into(),
                ..Default::default()
            },
        ],
        transactions: vec![Transaction {
            name: "Sell some".into(),
            from: "Shares".into(),
            from_value: "20000".into(),
            to: "Cash".into(),
            date: "2019-06-01".into(),
            ..Default::default()
        }],
        ..Default::default()
    };
    let projection = run(
        &model,
        &config(date(2019, 4, 6), date(2020, 4, 6), date(2019, 4, 6)),
    );

    assert!(projection.warnings.is_empty());
    assert_eq!(value_of(&projection, "Shares"), dec!(280000));
    assert_eq!(value_of(&projection, "Shares (basis)"), dec!(46666.67));
    assert_eq!(value_of(&projection, "Joe gain (CGT)"), dec!(933.33));
    assert_eq!(value_of(&projection, "Cash"), dec!(20000) - dec!(933.33));
}

#[test]
fn national_insurance_settles_before_income_tax() {
    let model = Model {
        assets: vec![Asset {
            name: "Cash".into(),
            start: "2019-04-06".into(),
            value: "0".into(),
            can_be_negative: true,
            ..Default::default()
        }],
        incomes: vec![Income {
            name: "Contract".into(),
            start: "2019-07-01".into(),
            end: "2019-07-02".into(),
            value: "60000".into(),
            liability: "Joe(incomeTax)/Joe(NI)".into(),
            ..Default::default()
        }],
        ..Default::default()
    };
    let projection = run(
        &model,
        &config(date(2019, 4, 6), date(2020, 4, 6), date(2019, 4, 6)),
    );

    let settlement: Vec<_> = projection
        .evaluations
        .iter()
        .filter(|e| e.name.starts_with("Joe "))
        .map(|e| (e.name.as_str(), e.value))
        .collect();
    assert_eq!(
        settlement,
        vec![
            ("Joe income (NI)", dec!(5164.16)),
            ("Joe income (net of NI)", dec!(54835.84)),
            ("Joe income (incomeTax)", dec!(9434.34)),
            ("Joe income (net)", dec!(45401.50)),
        ]
    );
    assert_eq!(
        value_of(&projection, "Cash"),
        dec!(60000) - dec!(5164.16) - dec!(9434.34)
    );
}
