// End-to-end tests: seed script on disk, pipeline, both export formats

use coursedb::export;
use coursedb::{
    error_kind, Error, ExportOptions, Format, Params, Pipeline, QueryName, Request, State,
    StoreSource,
};
use std::path::PathBuf;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/school.sql")
}

fn pipeline() -> Pipeline {
    Pipeline::new(StoreSource::Path(fixture()))
}

fn run(query: &str, params: Params, format: &str) -> coursedb::Result<coursedb::Export> {
    pipeline().run(&Request::new(query, params, format))
}

/// A valid parameter set for every catalog query
fn sample_requests() -> Vec<(QueryName, Params)> {
    vec![
        (QueryName::ListStudents, Params::new()),
        (QueryName::FindStudentsByName, Params::new().with("name", "hOP")),
        (QueryName::CoursesForStudent, Params::new().with("student_id", 1)),
        (QueryName::ReviewsForCourse, Params::new().with("course_id", 10)),
        (QueryName::ReviewsForStudent, Params::new().with("student_id", 1)),
        (QueryName::LowRatedReviews, Params::new().with("max_rating", 1)),
        (QueryName::RatingSummaryForStudent, Params::new().with("student_id", 1)),
    ]
}

#[test]
fn test_every_query_is_exercised() {
    let covered: Vec<_> = sample_requests().into_iter().map(|(q, _)| q).collect();
    assert_eq!(covered, QueryName::ALL.to_vec());
}

#[test]
fn test_json_and_xml_carry_the_same_records() {
    for pretty in [false, true] {
        let mut pipeline = pipeline().with_options(ExportOptions { pretty });

        for (query, params) in sample_requests() {
            let json = pipeline
                .run(&Request::new(query.as_str(), params.clone(), "json"))
                .unwrap();
            let xml = pipeline
                .run(&Request::new(query.as_str(), params, "xml"))
                .unwrap();

            let from_json = export::decode(Format::Json, query, &json.document).unwrap();
            let from_xml = export::decode(Format::Xml, query, &xml.document).unwrap();

            assert_eq!(from_json, from_xml, "{}", query);
            assert_eq!(json.record_count, from_json.len());
            assert_eq!(xml.record_count, from_xml.len());
            for record in &from_json {
                let names: Vec<_> = record.fields().iter().map(|(n, _)| *n).collect();
                let declared: Vec<_> = query.schema().names().collect();
                assert_eq!(names, declared);
            }
        }
    }
}

#[test]
fn test_repeated_runs_are_identical() {
    let mut pipeline = pipeline();
    for (query, params) in sample_requests() {
        for format in ["json", "xml"] {
            let request = Request::new(query.as_str(), params.clone(), format);
            let first = pipeline.run(&request).unwrap();
            let second = pipeline.run(&request).unwrap();
            assert_eq!(first, second);
        }
    }
}

#[test]
fn test_students_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two.sql");
    std::fs::write(
        &path,
        "CREATE TABLE student (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
         CREATE TABLE course (id INTEGER PRIMARY KEY, subject TEXT NOT NULL,
             student_id INTEGER NOT NULL REFERENCES student(id));
         CREATE TABLE review (id INTEGER PRIMARY KEY, course_id INTEGER NOT NULL REFERENCES course(id),
             rating INTEGER NOT NULL, comment TEXT, authored_at TEXT NOT NULL);
         INSERT INTO student VALUES (1, 'Ada'), (2, 'Grace');",
    )
    .unwrap();
    let mut pipeline = Pipeline::new(StoreSource::Path(path));

    let json = pipeline
        .run(&Request::new("list_students", Params::new(), "json"))
        .unwrap();
    assert_eq!(json.document, r#"[{"id":1,"name":"Ada"},{"id":2,"name":"Grace"}]"#);

    let xml = pipeline
        .run(&Request::new("list_students", Params::new(), "xml"))
        .unwrap();
    assert_eq!(
        xml.document,
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "<list_students>",
            "<result><id>1</id><name>Ada</name></result>",
            "<result><id>2</id><name>Grace</name></result>",
            "</list_students>"
        )
    );
    assert_eq!(xml.record_count, 2);
}

#[test]
fn test_student_without_courses_is_empty_not_missing() {
    let params = Params::new().with("student_id", 3);

    let json = run("courses_for_student", params.clone(), "json").unwrap();
    assert_eq!(json.document, "[]");
    assert_eq!(json.record_count, 0);

    let xml = run("courses_for_student", params, "xml").unwrap();
    assert!(xml.document.ends_with("<courses_for_student/>"));

    let err = run("courses_for_student", Params::new().with("student_id", 99), "json").unwrap_err();
    assert!(matches!(
        err,
        Error::NotFound { entity: "student", id: 99, .. }
    ));
    assert_eq!(error_kind(&err), "NotFoundError");
}

#[test]
fn test_parent_queries_separate_missing_from_empty() {
    // (query, parameter, parent with no children, parent entity)
    let cases: [(&str, &str, i64, &str); 4] = [
        ("courses_for_student", "student_id", 3, "student"),
        ("reviews_for_course", "course_id", 12, "course"),
        ("reviews_for_student", "student_id", 3, "student"),
        ("rating_summary_for_student", "student_id", 3, "student"),
    ];

    for (query, parameter, childless, parent) in cases {
        let params = Params::new().with(parameter, childless);
        let json = run(query, params.clone(), "json").unwrap();
        assert_eq!(json.document, "[]", "{}", query);
        assert_eq!(json.record_count, 0);

        let xml = run(query, params, "xml").unwrap();
        assert_eq!(
            xml.document,
            format!(r#"<?xml version="1.0" encoding="UTF-8"?><{}/>"#, query)
        );

        for format in ["json", "xml"] {
            let err = run(query, Params::new().with(parameter, 77), format).unwrap_err();
            assert!(
                matches!(err, Error::NotFound { entity, id: 77, .. } if entity == parent),
                "{} as {}: {:?}",
                query,
                format,
                err
            );
        }
    }
}

#[test]
fn test_reviews_for_course_normalizes_values() {
    let export = run("reviews_for_course", Params::new().with("course_id", 10), "json").unwrap();
    assert_eq!(
        export.document,
        concat!(
            r#"[{"id":100,"course_id":10,"rating":4,"comment":"Rigorous & fun","authored_at":"2024-01-15T09:30:00Z"},"#,
            r#"{"id":101,"course_id":10,"rating":3,"comment":null,"authored_at":"2024-01-16T10:00:00Z"}]"#
        )
    );
}

#[test]
fn test_low_rated_reviews_escape_in_xml() {
    let export = run("low_rated_reviews", Params::new().with("max_rating", 1), "xml").unwrap();
    assert_eq!(export.record_count, 2);
    assert!(export.document.contains("<comment>Too &lt;abstract&gt;</comment>"));
    assert!(export.document.contains("<comment></comment>"));
    assert!(export.document.contains("<authored_at>2024-02-01T10:00:00Z</authored_at>"));
    assert!(export.document.contains("<student_name>Grace Hopper</student_name>"));
}

#[test]
fn test_rating_summary() {
    let export = run(
        "rating_summary_for_student",
        Params::new().with("student_id", 1),
        "json",
    )
    .unwrap();
    assert_eq!(
        export.document,
        concat!(
            r#"[{"course_id":10,"subject":"Mathematics","review_count":2,"average_rating":3.5},"#,
            r#"{"course_id":11,"subject":"Poetry","review_count":1,"average_rating":1.0},"#,
            r#"{"course_id":12,"subject":"Chemistry","review_count":0,"average_rating":null}]"#
        )
    );

    let xml = run(
        "rating_summary_for_student",
        Params::new().with("student_id", 1),
        "xml",
    )
    .unwrap();
    assert!(xml.document.contains("<average_rating>3.5</average_rating>"));
    assert!(xml.document.contains("<average_rating>1.0</average_rating>"));
    assert!(xml.document.contains("<average_rating/>"));
}

#[test]
fn test_find_students_by_name_is_case_insensitive() {
    let export = run("find_students_by_name", Params::new().with("name", "hOP"), "json").unwrap();
    assert_eq!(export.document, r#"[{"id":2,"name":"Grace Hopper"}]"#);
}

#[test]
fn test_invalid_requests() {
    let err = run("list_students", Params::new(), "yaml").unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat { ref format } if format == "yaml"));

    let err = run("list_reviews", Params::new(), "json").unwrap_err();
    assert_eq!(error_kind(&err), "InvalidQueryError");

    let err = run("low_rated_reviews", Params::new().with("max_rating", 7), "json").unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidParameter { ref parameter, .. } if parameter == "max_rating"
    ));

    let err = run("courses_for_student", Params::new().with("student_id", "one"), "xml").unwrap_err();
    assert_eq!(error_kind(&err), "InvalidParameterError");
}

#[test]
fn test_corrupt_rating_fails_whole_invocation() {
    let seed = std::fs::read_to_string(fixture()).unwrap();
    let seed = seed.replace("(104, 20, 2, 'ok'", "(104, 20, 9, 'ok'");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.sql");
    std::fs::write(&path, seed).unwrap();

    let mut pipeline = Pipeline::new(StoreSource::Path(path));
    let err = pipeline
        .run(&Request::new(
            "reviews_for_student",
            Params::new().with("student_id", 2),
            "json",
        ))
        .unwrap_err();
    assert_eq!(error_kind(&err), "StorageUnavailableError");
    assert_eq!(pipeline.state(), State::Failed);

    // Unaffected queries still succeed against the same store
    let export = pipeline
        .run(&Request::new("list_students", Params::new(), "json"))
        .unwrap();
    assert_eq!(export.record_count, 3);
    assert_eq!(pipeline.state(), State::Idle);
}

#[test]
fn test_missing_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::new(StoreSource::Path(dir.path().join("absent.sql")));
    let err = pipeline
        .run(&Request::new("list_students", Params::new(), "json"))
        .unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable { .. }));
}
