mod test_support;

use serde_json::{json, Value};
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

fn id_of(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(|o| o.get("id"))
        .and_then(|v| v.as_str())
        .expect("id")
        .to_string()
}

fn error_fields(v: &Value) -> Vec<String> {
    v.get("error")
        .and_then(|e| e.get("details"))
        .and_then(|d| d.get("errors"))
        .and_then(|e| e.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|e| e.get("field").and_then(|f| f.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn scholarship_crud_applies_domain_rules() {
    let workspace = temp_dir("scholard-scholarships-ipc");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "people.create",
        json!({ "name": "ana souza", "email": "ANA@ufx.br" }),
    );
    assert_eq!(student["person"]["name"], "Ana Souza");
    assert_eq!(student["person"]["email"], "ana@ufx.br");
    let student_id = id_of(&student, "person");

    let dup = request(
        &mut stdin,
        &mut reader,
        "2b",
        "people.create",
        json!({ "name": "Outra Ana", "email": "ana@ufx.br" }),
    );
    assert_eq!(error_code(&dup), "validation_failed");

    let supervisor_id = id_of(
        &request_ok(
            &mut stdin,
            &mut reader,
            "3",
            "people.create",
            json!({ "name": "Bruno Lima" }),
        ),
        "person",
    );
    let same_name = request(
        &mut stdin,
        &mut reader,
        "3b",
        "people.create",
        json!({ "name": "bruno  LIMA" }),
    );
    assert_eq!(error_code(&same_name), "validation_failed");
    assert_eq!(same_name["error"]["details"]["table"], "people");

    let campus = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "campuses.create",
        json!({ "name": "Campus Centro" }),
    );
    assert_eq!(campus["campus"]["code"], "CENTRO");
    let campus_id = id_of(&campus, "campus");
    let type_id = id_of(
        &request_ok(
            &mut stdin,
            &mut reader,
            "5",
            "scholarshipTypes.create",
            json!({ "name": "PIBIC" }),
        ),
        "scholarshipType",
    );

    let invalid = request(
        &mut stdin,
        &mut reader,
        "6",
        "scholarships.create",
        json!({
            "title": "  ",
            "campusId": campus_id,
            "startDate": "01/03/2024",
            "endDate": "01/02/2024",
            "supervisorId": student_id,
            "studentId": student_id,
        }),
    );
    assert_eq!(error_code(&invalid), "validation_failed");
    assert_eq!(error_fields(&invalid), vec!["title", "student", "end_date"]);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "scholarships.create",
        json!({
            "title": "Plano de trabalho",
            "typeId": type_id,
            "campusId": campus_id,
            "startDate": "2024-03-01",
            "endDate": "28/02/2025",
            "supervisorId": supervisor_id,
            "studentId": student_id,
            "value": "1.500,50",
        }),
    );
    assert_eq!(created["scholarship"]["value"], "1500.50");
    assert_eq!(created["scholarship"]["startDate"], "2024-03-01");
    let scholarship_id = id_of(&created, "scholarship");

    let overlap = request(
        &mut stdin,
        &mut reader,
        "8",
        "scholarships.create",
        json!({
            "title": "Segundo plano",
            "campusId": campus_id,
            "startDate": "2024-09-01",
            "supervisorId": supervisor_id,
            "studentId": student_id,
        }),
    );
    assert_eq!(error_code(&overlap), "validation_failed");
    assert!(overlap["error"]["message"]
        .as_str()
        .unwrap_or_default()
        .contains("Plano de trabalho"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "scholarshipTypes.setActive",
        json!({ "typeId": type_id, "active": false }),
    );
    // Retired types still allow edits to existing records.
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "scholarships.update",
        json!({ "scholarshipId": scholarship_id, "patch": { "value": 800, "endDate": null } }),
    );
    assert_eq!(updated["scholarship"]["value"], "800.00");
    assert!(updated["scholarship"]["endDate"].is_null());

    let retired = request(
        &mut stdin,
        &mut reader,
        "11",
        "scholarships.create",
        json!({
            "title": "Outro",
            "typeId": type_id,
            "campusId": campus_id,
            "startDate": "2024-03-01",
            "supervisorId": student_id,
            "studentId": supervisor_id,
        }),
    );
    assert_eq!(error_fields(&retired), vec!["scholarship_type"]);

    let missing_campus = request(
        &mut stdin,
        &mut reader,
        "12",
        "scholarships.create",
        json!({
            "title": "Sem campus",
            "campusId": "nope",
            "startDate": "2030-01-01",
            "supervisorId": student_id,
            "studentId": supervisor_id,
        }),
    );
    assert_eq!(error_code(&missing_campus), "not_found");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "scholarships.list",
        json!({ "studentId": student_id }),
    );
    assert_eq!(listed["scholarships"].as_array().map(Vec::len), Some(1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "scholarships.delete",
        json!({ "scholarshipId": scholarship_id }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "15",
        "scholarships.delete",
        json!({ "scholarshipId": scholarship_id }),
    );
    assert_eq!(error_code(&gone), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
