use serde_json::Value;

fn schema_properties(doc: &Value, name: &str) -> serde_json::Map<String, Value> {
    doc.get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(|s| s.get(name))
        .and_then(|t| t.get("properties"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_else(|| panic!("components.schemas.{name}.properties must exist"))
}

#[test]
fn openapi_exposes_work_log_evidence_collections() -> anyhow::Result<()> {
    // Build the OpenAPI document the same way the server does
    let doc = site_supervision::docs::build_openapi(8000)?;
    let v = serde_json::to_value(&doc)?;

    let props = schema_properties(&v, "WorkLog");
    for key in ["code", "status", "initial_evidence", "follow_up_evidence", "latitude", "longitude"] {
        assert!(props.contains_key(key), "OpenAPI WorkLog schema missing '{key}'");
    }

    let props = schema_properties(&v, "User");
    assert!(props.contains_key("max_obras"));
    assert!(!props.contains_key("password_hash"));

    Ok(())
}

#[test]
fn multipart_endpoints_declare_form_bodies() -> anyhow::Result<()> {
    let doc = site_supervision::docs::build_openapi(8000)?;
    let v = serde_json::to_value(&doc)?;

    for path in ["/work-logs", "/work-orders"] {
        let content = v
            .pointer(&format!("/paths/{}/post/requestBody/content", path.replace('/', "~1")))
            .and_then(Value::as_object)
            .unwrap_or_else(|| panic!("{path} must document a request body"));
        assert!(content.contains_key("multipart/form-data"), "{path} is not multipart");
    }
    Ok(())
}
