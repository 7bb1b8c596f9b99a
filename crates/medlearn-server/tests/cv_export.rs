mod common;

use common::{TestServer, assert_error, json_body};
use reqwest::StatusCode;
use serde_json::{Value, json};

fn sample_cv() -> Value {
    json!({
        "personal": {
            "full_name": "Amélie Laurent",
            "title": "Emergency Physician",
            "email": "amelie@example.org",
            "date_of_birth": "1988-04-12"
        },
        "summary": "Emergency physician with a focus on point of care ultrasound.",
        "education": [{
            "institution": "Université de Lyon",
            "degree": "MD",
            "start": "2006-09",
            "end": "2013-06"
        }],
        "experience": [{
            "organization": "Hôpital Edouard Herriot",
            "position": "Attending",
            "start": "2016",
            "description": "Leads the ultrasound teaching programme."
        }],
        "skills": ["POCUS", "ACLS"],
        "languages": [{ "language": "English", "proficiency": "C1" }]
    })
}

#[tokio::test]
async fn save_fetch_and_delete() {
    let server = TestServer::start().await;
    let (token, user_id) = server.register("amelie@example.org", "Amélie Laurent").await;

    let res = server.get("/api/cv", Some(&token)).await;
    assert_error(res, StatusCode::NOT_FOUND, "not-found").await;

    let res = server.put("/api/cv", &token, sample_cv()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let saved = json_body(res).await;
    assert_eq!(saved["user_id"], user_id.as_str());
    // "YYYY" is accepted and stored as January
    assert_eq!(saved["cv"]["experience"][0]["start"], "2016-01");

    let fetched = json_body(server.get("/api/cv", Some(&token)).await).await;
    assert_eq!(fetched["cv"]["skills"], json!(["POCUS", "ACLS"]));

    let res = server.delete("/api/cv", &token).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = server.get("/api/cv", Some(&token)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn invalid_cv_lists_fields() {
    let server = TestServer::start().await;
    let (token, _) = server.register("bad-cv@example.org", "Bad CV").await;

    let mut cv = sample_cv();
    cv["personal"]["full_name"] = json!("");
    cv["education"][0]["end"] = json!("2005-01");

    let res = server.put("/api/cv", &token, cv).await;
    let body = assert_error(res, StatusCode::UNPROCESSABLE_ENTITY, "validation").await;
    let fields: Vec<&str> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"personal.full_name"));
    assert!(fields.contains(&"education[0].end"));

    server.stop().await;
}

#[tokio::test]
async fn pdf_export() {
    let server = TestServer::start().await;
    let (token, user_id) = server.register("pdf@example.org", "Amélie Laurent").await;

    let res = server.get("/api/cv/pdf", Some(&token)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    server.put("/api/cv", &token, sample_cv()).await;
    let res = server.get("/api/cv/pdf", Some(&token)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/pdf");
    assert_eq!(
        res.headers()["content-disposition"],
        "attachment; filename=\"Am_lie_Laurent-cv.pdf\""
    );
    let bytes = res.bytes().await.unwrap();
    assert!(bytes.starts_with(b"%PDF-1.4"));
    assert!(bytes.ends_with(b"%%EOF\n"));

    // Admins can export anyone's CV, users cannot
    let (other, _) = server.register("other@example.org", "Other").await;
    let path = format!("/api/admin/users/{user_id}/cv/pdf");
    assert_eq!(server.get(&path, Some(&other)).await.status(), StatusCode::FORBIDDEN);

    let admin = server.admin_token().await;
    let res = server.get(&path, Some(&admin)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.bytes().await.unwrap().starts_with(b"%PDF"));

    let res = server.get("/api/admin/users/nope/cv/pdf", Some(&admin)).await;
    assert_error(res, StatusCode::NOT_FOUND, "not-found").await;

    server.stop().await;
}
