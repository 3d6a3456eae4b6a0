use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use mhm_aggregate::flags::{parse_feature, parse_histogram, parse_questionnaire, parse_slider};
use mhm_aggregate::{EngineConfig, SummaryConfig, TimeResolution, run_summary};
use serde_json::{Value, json};
use tempfile::tempdir;

fn write_gz(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    encoder.write_all(contents.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn summary_config() -> SummaryConfig {
    SummaryConfig::default()
        .with_feature(
            parse_feature("steps:android_phone_step_count:value.time:value.steps:count").unwrap(),
        )
        .unwrap()
        .with_feature(
            parse_feature("walking:activity:value.time:value.type:WALKING:value.confidence")
                .unwrap(),
        )
        .unwrap()
        .with_questionnaire(parse_questionnaire("questionnaire_mood:value.timeCompleted").unwrap())
        .with_slider(
            parse_slider("mood:questionnaire_mood:value.answers:neg_:value:value.timeCompleted")
                .unwrap(),
        )
        .with_histogram(
            parse_histogram("sleep:questionnaire_mood:value.answers:sleep_1:value:startTime")
                .unwrap(),
        )
}

fn seed_tree(root: &Path) {
    // 2023-11-14 and 2023-11-15, plus one December row.
    write_gz(
        &root.join("SITE1/P1/android_phone_step_count/20231114_0000.csv.gz"),
        "value.time,value.steps\n1700000000,10\n1700090000,20\n1700090100,n/a\nbad,99\n1701388800,5\n",
    );
    write_gz(
        &root.join("SITE1/P1/activity/20231114_0000.csv.gz"),
        "value.time,value.type,value.confidence\n1700000000,WALKING,80\n1700000060,STILL,90\n",
    );
    write_gz(
        &root.join("SITE1/P1/questionnaire_mood/20231114_0000.csv.gz"),
        concat!(
            "value.timeCompleted,value.answers.0.questionId,value.answers.0.value,",
            "value.answers.0.startTime,value.answers.1.questionId,value.answers.1.value,",
            "value.answers.1.startTime\n",
            "1700000000,neg_1,3,1700000001,sleep_1,good,1700000002\n",
            "1700090000,neg_2,5,1700090001,sleep_1,good,1700090002\n",
        ),
    );
}

#[test]
fn monthly_documents_carry_features_and_questionnaires() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    seed_tree(input.path());

    let report = run_summary(&EngineConfig::new(input.path(), output.path()), &summary_config())
        .unwrap();
    assert_eq!(report.files_processed, 3);

    let november = read_json(&output.path().join("P1_2023-11.json"));
    assert_eq!(november["patient_id"], "P1");
    assert_eq!(november["site"], "SITE1");
    assert_eq!(
        november["data_summary"],
        json!({
            "start_date": "2023-11-14",
            "end_date": "2023-11-15",
            "total_days_with_data": 2,
            "missing_days": null,
            "features_available": ["steps", "walking"],
        })
    );

    let steps = &november["feature_statistics"]["steps"];
    assert_eq!(steps["total_entries"], 3);
    assert_eq!(steps["days_with_data"], 2);
    assert_eq!(steps["mean"], 15.0);
    assert_eq!(steps["std_dev"], 5.0);
    assert_eq!(steps["unit"], "count");

    let walking = &november["feature_statistics"]["walking"];
    assert_eq!(walking["total_entries"], 1);
    assert_eq!(walking["max"], 80.0);
    assert!(walking.get("unit").is_none());

    let responses = &november["questionnaire_responses"];
    assert_eq!(responses["total_responses"], 2);
    assert_eq!(responses["days_with_responses"], 2);
    assert_eq!(responses["slider"]["mood"]["total_entries"], 2);
    assert_eq!(responses["slider"]["mood"]["median"], 4.0);
    assert_eq!(responses["histogram"]["sleep"]["sleep_1"]["good"], 2);

    let december = read_json(&output.path().join("P1_2023-12.json"));
    assert_eq!(december["feature_statistics"]["steps"]["total_entries"], 1);
    assert_eq!(december["feature_statistics"]["walking"]["mean"], Value::Null);
    assert_eq!(december["data_summary"]["features_available"], json!(["steps"]));
}

#[test]
fn weekly_resolution_uses_iso_week_keys() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    seed_tree(input.path());
    let config = summary_config().with_time_resolution(TimeResolution::Week);

    run_summary(&EngineConfig::new(input.path(), output.path()), &config).unwrap();
    assert!(output.path().join("P1_2023-W46.json").is_file());
    assert!(output.path().join("P1_2023-W48.json").is_file());
}

#[test]
fn merged_tree_without_site_reports_null_site() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_gz(
        &input.path().join("P7/android_phone_step_count/android_phone_step_count.csv.gz"),
        "value.time,value.steps\n1700000000,10\n",
    );

    run_summary(&EngineConfig::new(input.path(), output.path()), &summary_config()).unwrap();
    let document = read_json(&output.path().join("P7_2023-11.json"));
    assert_eq!(document["site"], Value::Null);
    assert_eq!(document["feature_statistics"]["steps"]["mean"], 10.0);
}

#[test]
fn summary_without_recipes_is_rejected() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    assert!(
        run_summary(
            &EngineConfig::new(input.path(), output.path()),
            &SummaryConfig::default()
        )
        .is_err()
    );
}
