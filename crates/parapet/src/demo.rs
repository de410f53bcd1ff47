//! A small inventory API used by `parapet serve` and `parapet spec`.
//!
//! It touches every operation annotation: header, path, query, JSON body,
//! multipart form, auth, responses with and without the default 422, a
//! response header, a per-response `Location` header, tags, summaries and a
//! blueprint.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    http::{header, Method},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use parapet_spec::{Schema, SchemaDescriptor, Tag};

use crate::api::Api;
use crate::blueprint::Blueprint;
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiException};
use crate::params::Parameters;
use crate::reply::Reply;
use crate::token::TokenCodec;

/// Credentials accepted by the demo login.
pub const DEMO_USERNAME: &str = "admin";
pub const DEMO_PASSWORD: &str = "admin";

#[derive(Debug, Deserialize)]
pub struct ItemPath {
    pub id: i64,
}

impl Schema for ItemPath {
    fn describe() -> SchemaDescriptor {
        SchemaDescriptor::titled("ItemPath").field("id", json!({"type": "integer"}), true)
    }
}

#[derive(Debug, Deserialize)]
pub struct ItemQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl Schema for ItemQuery {
    fn describe() -> SchemaDescriptor {
        SchemaDescriptor::titled("ItemQuery")
            .field("page", json!({"type": "integer", "minimum": 1}), false)
            .field(
                "per_page",
                json!({"type": "integer", "minimum": 1, "maximum": 100}),
                false,
            )
    }
}

#[derive(Debug, Deserialize)]
pub struct TraceHeader {
    pub x_request_id: Option<String>,
}

impl Schema for TraceHeader {
    fn describe() -> SchemaDescriptor {
        SchemaDescriptor::titled("TraceHeader").field(
            "x_request_id",
            json!({"type": "string", "minLength": 1}),
            false,
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct ItemCreate {
    pub name: String,
    pub price: f64,
}

impl Schema for ItemCreate {
    fn describe() -> SchemaDescriptor {
        SchemaDescriptor::titled("ItemCreate")
            .description("A new inventory item")
            .field("name", json!({"type": "string", "minLength": 1}), true)
            .field("price", json!({"type": "number", "minimum": 0}), true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub price: f64,
}

impl Schema for Item {
    fn describe() -> SchemaDescriptor {
        SchemaDescriptor::titled("Item")
            .field("id", json!({"type": "integer"}), true)
            .field("name", json!({"type": "string"}), true)
            .field("price", json!({"type": "number"}), true)
    }
}

#[derive(Debug, Serialize)]
pub struct ItemList {
    pub items: Vec<Item>,
}

impl Schema for ItemList {
    fn describe() -> SchemaDescriptor {
        SchemaDescriptor::titled("ItemList").field(
            "items",
            json!({"type": "array", "items": {"$ref": "#/components/schemas/Item"}}),
            true,
        )
    }
}

struct NoContent;

impl Schema for NoContent {
    fn describe() -> SchemaDescriptor {
        SchemaDescriptor::titled("NoContent").description("Empty response")
    }
}

#[derive(Debug, Deserialize)]
pub struct Login {
    pub username: String,
    pub password: String,
}

impl Schema for Login {
    fn describe() -> SchemaDescriptor {
        SchemaDescriptor::titled("Login")
            .field("username", json!({"type": "string"}), true)
            .field("password", json!({"type": "string", "format": "password"}), true)
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

impl Schema for TokenResponse {
    fn describe() -> SchemaDescriptor {
        SchemaDescriptor::titled("TokenResponse").field("token", json!({"type": "string"}), true)
    }
}

#[derive(Debug, Deserialize)]
pub struct Upload {
    pub title: String,
}

impl Schema for Upload {
    fn describe() -> SchemaDescriptor {
        SchemaDescriptor::titled("Upload")
            .field("title", json!({"type": "string", "minLength": 1}), true)
            .field("photo", json!({"type": "string", "format": "binary"}), true)
    }
}

#[derive(Debug, Serialize)]
pub struct Uploaded {
    pub title: String,
    pub file_name: Option<String>,
    pub size: usize,
}

impl Schema for Uploaded {
    fn describe() -> SchemaDescriptor {
        SchemaDescriptor::titled("Uploaded")
            .field("title", json!({"type": "string"}), true)
            .field("file_name", json!({"type": "string"}), false)
            .field("size", json!({"type": "integer"}), true)
    }
}

type Store = Arc<RwLock<BTreeMap<i64, Item>>>;

/// Build the demo API.
pub fn build(config: ApiConfig) -> Result<Api, ApiError> {
    let mut api = Api::new(config)?;
    let store: Store = Arc::new(RwLock::new(BTreeMap::from([(
        1,
        Item {
            id: 1,
            name: "Desk lamp".to_string(),
            price: 24.5,
        },
    )])));

    let auth_tag = Tag::new("auth", "Token issuing");
    let items_tag = Tag::new("items", "Inventory items");

    let login_op = {
        let tokens = api.tokens().clone();
        api.operation("login", Method::POST)
            .body::<Login>()
            .response::<TokenResponse>(200)
            .tag(auth_tag)
            .summary("Exchange credentials for a bearer token")
            .handle(move |params| login(tokens.clone(), params))?
    };
    api.route("/login", login_op)?;

    let list = {
        let store = store.clone();
        api.operation("items", Method::GET)
            .header::<TraceHeader>()
            .query::<ItemQuery>()
            .response::<ItemList>(200)
            .tag(items_tag.clone())
            .summary("List items")
            .handle(move |params| list_items(store.clone(), params))?
    };
    let create = {
        let store = store.clone();
        let tokens = api.tokens().clone();
        api.operation("items", Method::POST)
            .auth()
            .body::<ItemCreate>()
            .response::<Item>(201)
            .response_header("Cache-Control", "no-store")
            .tag(items_tag.clone())
            .summary("Create an item")
            .operation_id("createItem")
            .handle_reply(move |params| create_item(store.clone(), tokens.clone(), params))?
    };
    api.route("/items", list)?.route("/items", create)?;

    let show = {
        let store = store.clone();
        api.operation("item", Method::GET)
            .path::<ItemPath>()
            .response::<Item>(200)
            .tag(items_tag.clone())
            .description("Fetch one item by its identifier.")
            .handle(move |params| show_item(store.clone(), params))?
    };
    let delete = {
        let store = store.clone();
        let tokens = api.tokens().clone();
        api.operation("item", Method::DELETE)
            .auth()
            .path::<ItemPath>()
            .response_with::<NoContent>(204, &[], false)
            .tag(items_tag)
            .handle(move |params| delete_item(store.clone(), tokens.clone(), params))?
    };
    api.route("/items/<int:id>", show)?
        .route("/items/<int:id>", delete)?;

    let upload_op = api
        .operation("upload", Method::POST)
        .form::<Upload>()
        .response::<Uploaded>(201)
        .summary("Upload a photo")
        .handle(upload)?;
    api.register_blueprint(Blueprint::new("files", "/files").route("/", upload_op))?;

    api.route_undocumented("/health", get(|| async { "ok" }))?;

    Ok(api)
}

async fn login(tokens: TokenCodec, params: Parameters) -> Result<TokenResponse, ApiException> {
    let body: Login = params.body_as()?;
    if body.username != DEMO_USERNAME || body.password != DEMO_PASSWORD {
        return Err(
            ApiException::unauthorized("bad credentials").with_error_name("bad_credentials"),
        );
    }
    let mut subjects = Map::new();
    subjects.insert("username".to_string(), Value::String(body.username));
    let token = tokens.encode(subjects, None)?;
    Ok(TokenResponse { token })
}

async fn list_items(store: Store, params: Parameters) -> Result<ItemList, ApiException> {
    let query: ItemQuery = params.query_as()?;
    let per_page = query.per_page.unwrap_or(20) as usize;
    let page = query.page.unwrap_or(1) as usize;
    let items = store
        .read()
        .await
        .values()
        .skip(page.saturating_sub(1) * per_page)
        .take(per_page)
        .cloned()
        .collect();
    Ok(ItemList { items })
}

async fn create_item(
    store: Store,
    tokens: TokenCodec,
    params: Parameters,
) -> Result<Reply<Item>, ApiException> {
    tokens.decode(params.require_auth()?)?;
    let body: ItemCreate = params.body_as()?;

    let mut items = store.write().await;
    let id = items.keys().next_back().copied().unwrap_or(0) + 1;
    let item = Item {
        id,
        name: body.name,
        price: body.price,
    };
    items.insert(id, item.clone());
    Reply::new(item).header(header::LOCATION, format!("/items/{id}"))
}

async fn show_item(store: Store, params: Parameters) -> Result<Item, ApiException> {
    let path: ItemPath = params.path_as()?;
    store
        .read()
        .await
        .get(&path.id)
        .cloned()
        .ok_or_else(|| ApiException::not_found(format!("item {} not found", path.id)))
}

async fn delete_item(
    store: Store,
    tokens: TokenCodec,
    params: Parameters,
) -> Result<Value, ApiException> {
    tokens.decode(params.require_auth()?)?;
    let path: ItemPath = params.path_as()?;
    match store.write().await.remove(&path.id) {
        Some(_) => Ok(Value::Null),
        None => Err(ApiException::not_found(format!("item {} not found", path.id))),
    }
}

async fn upload(params: Parameters) -> Result<Uploaded, ApiException> {
    let form: Upload = params.form_as()?;
    let photo = params
        .file("photo")
        .ok_or_else(|| ApiException::bad_request("photo must be a file part"))?;
    Ok(Uploaded {
        title: form.title,
        file_name: photo.file_name.clone(),
        size: photo.data.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_resolves() {
        let mut api = build(ApiConfig::default()).unwrap();
        let document = api.resolve().unwrap();

        assert!(document.operation("/items", "get").is_some());
        assert!(document.operation("/items", "post").is_some());
        assert!(document.operation("/items/{id}", "delete").is_some());
        assert!(document.operation("/files", "post").is_some());
        assert!(document.components.security_schemes.is_some());
        assert_eq!(document.tags.len(), 2);
    }
}
