//! Integration tests for the pipeline engine and its steps.
//!
//! Tests verify:
//! 1. QuadFposi writes the four reconciliation outputs and counts
//!    filtered and unjoinable rows
//! 2. CicliPreview writes classified detail and the monthly summary
//! 3. RaccInc maps migrations and shifts the month
//! 4. FrappPuma links guarantees to principal and linked cycles
//! 5. The engine runs steps in fixed order and aborts on the first error

use lgd_core::{
    cicli_preview_step, frapp_puma_step,
    config::PipelineConfig,
    error::LgdError,
    event::PipelineEvent,
    pipeline::{Pipeline, StepKind},
    quad_fposi_step, racc_inc_step,
    tabular::{MemoryStore, Table},
};

fn table(header: &[&str], rows: &[&[&str]]) -> Table {
    let mut t = Table::new(header.iter().map(|h| h.to_string()).collect());
    for r in rows {
        t.push(
            r.iter()
                .map(|v| Some(v.to_string()).filter(|s| !s.is_empty()))
                .collect(),
        );
    }
    t
}

fn column<'a>(store: &'a MemoryStore, stream: &str, col: &str) -> Vec<Option<&'a str>> {
    store
        .table(stream)
        .unwrap_or_else(|| panic!("{stream} was not written"))
        .column(col)
        .unwrap_or_else(|| panic!("{stream} has no column {col}"))
}

fn run(kinds: &[StepKind], store: &mut MemoryStore) -> lgd_core::pipeline::RunReport {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = PipelineConfig::default_test();
    let mut pipeline = Pipeline::build(&config, kinds).expect("build failed");
    pipeline.run(store).expect("run failed")
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: QuadFposi
// ─────────────────────────────────────────────────────────────────────────────

fn quad_store() -> MemoryStore {
    let primary = table(
        &["codicebanca", "ndgprincipale", "datainiziodef", "datafinedef", "datainiziopd", "datainizioinc", "datainiziosoff"],
        &[
            &["01", "A", "20070301", "99991231", "20070301", "", ""],
            &["01", "B", "20070401", "20080101", "", "", ""],
            &["01", "C", "20070501", "99991231", "", "", ""],
            &["01", "", "20070501", "99991231", "", "", ""],
        ],
    );
    let legacy = table(
        &["codicebanca", "ndgprincipale", "datainizioDEF", "dataFINEDEF", "dataINIZIOPD", "datainizioinc", "dataSOFFERENZA", "flagincristrut", "cumulo"],
        &[
            &["01", "A", "07-03-01", "", "07-03-02", "", "", "N", "1"],
            &["01", "B", "07-04-01", "08-01-01", "", "", "", "", ""],
            &["02", "D", "07-06-01", "", "", "", "", "", ""],
            &["02", "E", "06-01-01", "", "", "", "", "", ""],
            &["02", "F", "", "", "", "", "", "", ""],
        ],
    );
    MemoryStore::new()
        .with_table(quad_fposi_step::PRIMARY, primary)
        .with_table(quad_fposi_step::LEGACY, legacy)
}

#[test]
fn quad_fposi_writes_four_disjoint_outputs() {
    let mut store = quad_store();
    let report = run(&[StepKind::QuadFposi], &mut store);

    assert_eq!(report.rows_written(quad_fposi_step::NEW_ONLY), Some(1));
    assert_eq!(report.rows_written(quad_fposi_step::LEGACY_ONLY), Some(1));
    assert_eq!(report.rows_written(quad_fposi_step::MATCHED), Some(1));
    assert_eq!(report.rows_written(quad_fposi_step::CONFLICTING), Some(1));

    assert_eq!(column(&store, quad_fposi_step::NEW_ONLY, "hadoop_fposi.ndgprincipale"), vec![Some("C")]);
    assert_eq!(column(&store, quad_fposi_step::NEW_ONLY, "old_fposi.ndgprincipale"), vec![None]);
    assert_eq!(column(&store, quad_fposi_step::LEGACY_ONLY, "old_fposi.ndgprincipale"), vec![Some("D")]);
    assert_eq!(column(&store, quad_fposi_step::CONFLICTING, "hadoop_fposi.ndgprincipale"), vec![Some("A")]);
    assert_eq!(column(&store, quad_fposi_step::CONFLICTING, "old_fposi.cumulo"), vec![Some("1")]);
}

#[test]
fn quad_fposi_normalises_legacy_dates_and_tags_office() {
    let mut store = quad_store();
    run(&[StepKind::QuadFposi], &mut store);

    assert_eq!(column(&store, quad_fposi_step::MATCHED, "old_fposi.datainizioDEF"), vec![Some("20070401")]);
    assert_eq!(column(&store, quad_fposi_step::MATCHED, "old_fposi.dataFINEDEF"), vec![Some("20080101")]);
    assert_eq!(column(&store, quad_fposi_step::MATCHED, "ufficio"), vec![Some("OFF_TEST")]);
}

#[test]
fn quad_fposi_counts_filtered_and_unjoinable_rows() {
    let mut store = quad_store();
    let report = run(&[StepKind::QuadFposi], &mut store);

    let filtered: u64 = report
        .entries
        .iter()
        .filter_map(|e| match &e.event {
            PipelineEvent::RecordsFiltered { count, .. } => Some(*count),
            _ => None,
        })
        .sum();
    assert_eq!(filtered, 1, "the 2006 legacy row is outside the window");
    assert_eq!(report.unjoinable_total(), 2, "one keyless row per side");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: CicliPreview
// ─────────────────────────────────────────────────────────────────────────────

fn preview_store() -> MemoryStore {
    let positions = table(
        &[
            "codicebanca", "ndgprincipale", "datainiziodef", "datafinedef", "datainiziopd",
            "datainizioinc", "datainizioristrutt", "datasofferenza", "totaccordatodatdef",
            "totutilizzdatdef", "naturagiuridica_segm", "segmento",
        ],
        &[
            &["01", "A", "20190101", "99991231", "20190201", "", "", "", "100", "10", "PF", "01"],
            &["01", "A", "20190101", "99991231", "20190201", "", "", "", "50", "5", "PF", "01"],
            &["01", "B", "20180101", "20200601", "", "", "", "20180301", "7", "", "CO", "10"],
        ],
    );
    MemoryStore::new().with_table(cicli_preview_step::POSITIONS, positions)
}

#[test]
fn cicli_preview_detail_carries_lifecycle_and_broadcast_totals() {
    let mut store = preview_store();
    run(&[StepKind::CicliPreview], &mut store);

    let detail = cicli_preview_step::DETAIL;
    assert_eq!(column(&store, detail, "totaccordatodatdef"), vec![Some("150"), Some("150"), Some("7")]);
    assert_eq!(column(&store, detail, "totutilizzdatdef"), vec![Some("15"), Some("15"), None]);
    assert_eq!(column(&store, detail, "datainiziodef")[0], Some("2019-01-01"));
    assert_eq!(column(&store, detail, "datarif")[0], Some("20201231"));
    assert_eq!(column(&store, detail, "segmento_calc"), vec![Some("IM"), Some("IM"), Some("PR")]);
    assert_eq!(column(&store, detail, "stato_anagrafico"), vec![Some("PASTDUE"), Some("PASTDUE"), Some("SOFF")]);
    assert_eq!(column(&store, detail, "ciclo_soff"), vec![Some("N"), Some("N"), Some("S")]);
    assert_eq!(column(&store, detail, "flag_aperto"), vec![Some("A"), Some("A"), Some("C")]);
}

#[test]
fn cicli_preview_summary_groups_by_month_and_status() {
    let mut store = preview_store();
    run(&[StepKind::CicliPreview], &mut store);

    let summary = cicli_preview_step::SUMMARY;
    assert_eq!(column(&store, summary, "flag_aperto"), vec![Some("A"), Some("C")]);
    assert_eq!(column(&store, summary, "row_count"), vec![Some("2"), Some("1")]);
    assert_eq!(column(&store, summary, "mese_apertura"), vec![Some("201901"), Some("201801")]);
    assert_eq!(column(&store, summary, "mese_chiusura"), vec![Some("999912"), Some("202006")]);
    assert_eq!(column(&store, summary, "totaccordatodatdef"), vec![Some("150"), Some("7")]);
    assert_eq!(column(&store, summary, "totutilizzdatdef"), vec![Some("15"), None]);
}

#[test]
fn cicli_preview_row_counts_match_between_outputs() {
    let mut store = preview_store();
    run(&[StepKind::CicliPreview], &mut store);

    let detail_rows = store.table(cicli_preview_step::DETAIL).unwrap().len();
    let summary_total: usize = column(&store, cicli_preview_step::SUMMARY, "row_count")
        .into_iter()
        .map(|c| c.unwrap().parse::<usize>().unwrap())
        .sum();
    assert_eq!(detail_rows, summary_total);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: RaccInc
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn racc_inc_links_migrations() {
    let migrations = table(
        &["cd_isti_ced", "ndg_ced", "cd_isti_ric", "ndg_ric", "data_migraz"],
        &[
            &["01", "C1", "02", "R1", "20200131"],
            &["01", "C2", "02", "R2", "bad"],
        ],
    );
    let mut store = MemoryStore::new().with_table(racc_inc_step::MIGRATIONS, migrations);
    let report = run(&[StepKind::RaccInc], &mut store);

    let out = racc_inc_step::OUT;
    assert_eq!(column(&store, out, "ist_ric_inc"), vec![Some("02"), Some("02")]);
    assert_eq!(column(&store, out, "ndg_ced_inc"), vec![Some("C1"), Some("C2")]);
    assert_eq!(column(&store, out, "num_ric_inc"), vec![None, None]);
    assert_eq!(column(&store, out, "month_up"), vec![Some("20200229"), None]);
    assert_eq!(report.degraded_total(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: FrappPuma
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn frapp_puma_links_guarantees_inside_cycle_window() {
    let cycles = table(
        &["codicebanca", "ndgprincipale", "datainiziodef", "datafinedef", "codicebanca_collegato", "ndg_collegato", "cd_collegamento", "dt_rif_udct"],
        &[
            &["01", "N1", "20190101", "20200315", "01", "N1", "", ""],
            &["01", "N2", "20190101", "99991231", "01", "L1", "X", "20190630"],
        ],
    );
    let guarantees = table(
        &["cd_istituto", "ndg", "sportello", "dt_riferimento", "conto_esteso", "cd_puma2", "ide_garanzia", "importo", "fair_value"],
        &[
            &["01", "N1", "S1", "20181231", "C", "P", "G1", "10", "9"],
            &["01", "N1", "S1", "20190601", "C", "P", "G2", "10", "9"],
            &["01", "N1", "S1", "20190601", "C", "P", "G2", "10", "9"],
            &["01", "N1", "S1", "20200228", "C", "P", "G3", "10", "9"],
            &["01", "N1", "S1", "20200301", "C", "P", "G4", "10", "9"],
            &["01", "L1", "S2", "20190630", "C", "P", "G5", "10", "9"],
            &["01", "L1", "S2", "20190701", "C", "P", "G6", "10", "9"],
        ],
    );
    let mut store = MemoryStore::new()
        .with_table(frapp_puma_step::CYCLES, cycles)
        .with_table(frapp_puma_step::GUARANTEES, guarantees);
    run(&[StepKind::FrappPuma], &mut store);

    let out = frapp_puma_step::OUT;
    // Distinct rows come out sorted, so the L1 guarantee leads.
    assert_eq!(column(&store, out, "ide_garanzia"), vec![Some("G5"), Some("G2"), Some("G3")]);
    assert_eq!(column(&store, out, "ndgprincipale"), vec![Some("N2"), Some("N1"), Some("N1")]);
    assert_eq!(column(&store, out, "cd_isti"), vec![Some("01"), Some("01"), Some("01")]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: engine
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn steps_run_in_documented_order() {
    let config = PipelineConfig::default_test();
    let pipeline = Pipeline::build(&config, &[StepKind::RaccInc, StepKind::QuadFposi]).unwrap();
    assert_eq!(pipeline.step_names(), vec!["quad_fposi", "racc_inc"]);
}

#[test]
fn step_names_parse() {
    assert_eq!("quad_fposi".parse::<StepKind>().unwrap(), StepKind::QuadFposi);
    assert_eq!("cicli-preview".parse::<StepKind>().unwrap(), StepKind::CicliPreview);
    assert!(matches!("nope".parse::<StepKind>(), Err(LgdError::StepNotFound { .. })));
}

#[test]
fn invalid_configuration_fails_before_any_step() {
    let config = PipelineConfig::default_test().with_as_of_date("31/12/2020");
    assert!(matches!(
        Pipeline::build(&config, &StepKind::ALL),
        Err(LgdError::Configuration(_))
    ));
}

#[test]
fn first_failure_aborts_the_run() {
    // RaccInc has no input loaded, so FrappPuma must never start.
    let mut store = preview_store();
    let config = PipelineConfig::default_test();
    let mut pipeline =
        Pipeline::build(&config, &[StepKind::CicliPreview, StepKind::RaccInc, StepKind::FrappPuma]).unwrap();

    assert!(pipeline.run(&mut store).is_err());
    assert!(store.table(cicli_preview_step::DETAIL).is_some());
    assert!(store.table(frapp_puma_step::OUT).is_none());

    let last = pipeline.log().last().unwrap();
    assert_eq!(last.step, "racc_inc");
    assert!(matches!(last.event, PipelineEvent::RunFailed { .. }));
}

#[test]
fn failed_run_still_reports_counts_of_completed_steps() {
    // QuadFposi completes with unjoinable rows; RaccInc has no input.
    let mut store = quad_store();
    let config = PipelineConfig::default_test();
    let mut pipeline = Pipeline::build(&config, &[StepKind::QuadFposi, StepKind::RaccInc]).unwrap();
    assert!(pipeline.run(&mut store).is_err());

    let report = pipeline.report();
    assert_eq!(report.unjoinable_total(), 2);
    assert_eq!(report.degraded_total(), 0);
    assert_eq!(report.rows_written(quad_fposi_step::MATCHED), Some(1));
    let (step, error) = report.failure().expect("run_failed entry");
    assert_eq!(step, "racc_inc");
    assert!(error.contains("racc_inc.migrations"), "{error}");
}

#[test]
fn log_sequence_numbers_are_contiguous() {
    let mut store = preview_store();
    let report = run(&[StepKind::CicliPreview], &mut store);

    for (i, entry) in report.entries.iter().enumerate() {
        assert_eq!(entry.seq, i as u64);
        assert_eq!(entry.run_id, report.run_id);
    }
    assert_eq!(report.entries.first().unwrap().event_type, "run_started");
    assert_eq!(report.entries.last().unwrap().event_type, "run_completed");
    assert!(report.failure().is_none());
}
