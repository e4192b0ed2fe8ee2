use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{authz, models, routes};

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::login,
		routes::auth::me,
		routes::users::list_users,
		routes::users::create_user,
		routes::users::get_user,
		routes::users::update_user,
		routes::sites::list_sites,
		routes::sites::create_site,
		routes::sites::get_site,
		routes::sites::update_site,
		routes::sites::delete_site,
		routes::contractors::list_contractors,
		routes::contractors::create_contractor,
		routes::contractors::get_contractor,
		routes::contractors::delete_contractor,
		routes::work_orders::list_orders,
		routes::work_orders::create_order,
		routes::work_orders::get_order,
		routes::work_orders::delete_order,
		routes::work_logs::list_work_logs,
		routes::work_logs::create_work_log,
		routes::work_logs::get_work_log,
		routes::work_logs::update_work_log,
		routes::work_logs::delete_work_log
	),
	components(
		schemas(
			authz::Role,
			authz::Caller,
			routes::health::HealthResponse,
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::UserCreateRequest,
			models::user::UserUpdateRequest,
			models::site::Site,
			models::site::SiteStatus,
			models::site::SiteCreateRequest,
			models::site::SiteUpdateRequest,
			models::contractor::Contractor,
			models::contractor::ContractorCreateRequest,
			models::work_order::WorkOrder,
			models::work_order::WorkOrderSummary,
			models::work_order::WorkOrderStatus,
			models::work_order::Folder,
			models::work_order::Activity,
			models::work_order::Evaluation,
			models::work_order::EvaluationOutcome,
			models::work_order::ActivityMedia,
			models::work_order::WorkOrderCreateRequest,
			routes::work_orders::WorkOrderForm,
			models::work_log::WorkLog,
			models::work_log::WorkLogMedia,
			models::work_log::WorkLogStatus,
			models::work_log::EvidenceCategory,
			models::work_log::GpsMetadata,
			models::work_log::WorkLogCreateRequest,
			models::work_log::WorkLogUpdateRequest,
			routes::work_logs::WorkLogForm
		)
	),
	tags(
		(name = "Health", description = "Liveness and database reachability"),
		(name = "Auth", description = "Login and current identity"),
		(name = "Users", description = "Accounts within an organization"),
		(name = "Sites", description = "Construction sites"),
		(name = "Contractors", description = "Contractor catalogue"),
		(name = "Work orders", description = "Order, folder, activity and evaluation records"),
		(name = "Work logs", description = "Site observations with photographic evidence")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	ensure_security_components(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn root_object(doc: &mut Value) -> &mut Map<String, Value> {
	if !doc.is_object() {
		*doc = Value::Object(Map::new());
	}
	match doc {
		Value::Object(map) => map,
		_ => unreachable!("root was just replaced with an object"),
	}
}

fn child_object<'a>(parent: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
	let entry = parent
		.entry(key.to_string())
		.or_insert_with(|| Value::Object(Map::new()));
	root_object(entry)
}

fn ensure_security_components(doc: &mut Value) {
	let components = child_object(root_object(doc), "components");
	let schemes = child_object(components, "securitySchemes");

	schemes.insert(
		"bearer_auth".to_string(),
		json!({
			"type": "http",
			"scheme": "bearer",
			"bearerFormat": "JWT"
		}),
	);
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{port}");

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr
				.iter()
				.any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			root_object(doc).insert("servers".to_string(), json!([{ "url": server_url }]));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bearer_scheme_and_server_are_injected() {
		let doc = serde_json::to_value(build_openapi(9000).unwrap()).unwrap();
		assert_eq!(doc["components"]["securitySchemes"]["bearer_auth"]["scheme"], "bearer");
		assert_eq!(doc["servers"][0]["url"], "http://localhost:9000");
	}

	#[test]
	fn every_resource_is_documented() {
		let doc = serde_json::to_value(build_openapi(8000).unwrap()).unwrap();
		for path in ["/auth/login", "/sites/{id}", "/work-orders", "/work-logs/{id}", "/contractors"] {
			assert!(doc["paths"].get(path).is_some(), "missing {path}");
		}
	}
}
