use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use scholar_core::prompt::ASSISTANT_INSTRUCTIONS;
use scholar_core::{
    Annotation, IndexStatus, KnowledgeService, Message, Role, RunRequest, RunResult, RunStatus,
    UploadReceipt,
};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::retry::retry_with_backoff;

const FILES_PAGE_SIZE: u32 = 1000;
const VECTOR_STORE_PAGE_SIZE: u32 = 100;
const BOOTSTRAP_DELAYS: [Duration; 4] = [
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(6),
    Duration::from_secs(8),
];

#[derive(Debug, Clone)]
pub struct OpenAISettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub assistant_name: String,
    pub temperature: f32,
    pub max_num_results: u32,
    pub vector_store_name: String,
    pub vector_store_expiry_days: u32,
    pub poll_interval: Duration,
}

/// Thin client for the Assistants v2 REST surface.
struct Api {
    client: Client,
    api_key: String,
    base_url: String,
}

impl Api {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send(builder: RequestBuilder) -> anyhow::Result<Value> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {status}: {}", api_error_message(&body));
        }
        Ok(response.json::<Value>().await?)
    }

    async fn get(&self, path: &str) -> anyhow::Result<Value> {
        Self::send(self.request(Method::GET, path)).await
    }

    async fn post(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        Self::send(self.request(Method::POST, path).json(body)).await
    }

    async fn delete(&self, path: &str) -> anyhow::Result<Value> {
        Self::send(self.request(Method::DELETE, path)).await
    }

    /// Follow `after` cursors until the listing reports no more pages.
    async fn list_all(&self, path: &str, page_size: u32) -> anyhow::Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let url = after.as_ref().map_or_else(
                || format!("{path}&limit={page_size}"),
                |cursor| format!("{path}&limit={page_size}&after={cursor}"),
            );
            let page = self.get(&url).await?;
            let (data, last_id, has_more) = parse_page(&page)?;
            items.extend(data);

            match last_id {
                Some(id) if has_more => after = Some(id),
                _ => break,
            }
        }

        Ok(items)
    }
}

/// Knowledge service backed by an OpenAI assistant and its vector store.
pub struct OpenAIProvider {
    api: Api,
    assistant_id: String,
    vector_store_id: String,
    poll_interval: Duration,
}

impl OpenAIProvider {
    /// Resolve the assistant and vector store, creating either if missing.
    pub async fn connect(settings: &OpenAISettings) -> anyhow::Result<Self> {
        info!("Connecting to OpenAI at {}", settings.base_url);
        let api = Api {
            client: Client::new(),
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.clone(),
        };

        let assistant_id = retry_with_backoff(
            "Assistant lookup",
            || find_or_create_assistant(&api, settings),
            &BOOTSTRAP_DELAYS,
        )
        .await?;
        let vector_store_id = retry_with_backoff(
            "Vector store lookup",
            || find_or_create_vector_store(&api, settings),
            &BOOTSTRAP_DELAYS,
        )
        .await?;
        retry_with_backoff(
            "Vector store attach",
            || attach_vector_store(&api, &assistant_id, &vector_store_id),
            &BOOTSTRAP_DELAYS,
        )
        .await?;

        info!(
            assistant_id = %assistant_id,
            vector_store_id = %vector_store_id,
            "OpenAI provider ready"
        );

        Ok(Self {
            api,
            assistant_id,
            vector_store_id,
            poll_interval: settings.poll_interval,
        })
    }
}

impl OpenAIProvider {
    /// Add a created file to the vector store and wait until indexing ends.
    async fn index_file(&self, file_id: &str) -> anyhow::Result<UploadReceipt> {
        let mut entry = self
            .api
            .post(
                &format!("/vector_stores/{}/files", self.vector_store_id),
                &json!({ "file_id": file_id }),
            )
            .await?;

        loop {
            let receipt = parse_upload_receipt(&entry)?;
            if receipt.status != IndexStatus::InProgress {
                return Ok(receipt);
            }
            sleep(self.poll_interval).await;
            entry = self
                .api
                .get(&format!(
                    "/vector_stores/{}/files/{file_id}",
                    self.vector_store_id
                ))
                .await?;
        }
    }

    /// Delete a file whose indexing did not complete.
    async fn discard_file(&self, file_id: &str) {
        match self.api.delete(&format!("/files/{file_id}")).await {
            Ok(_) => debug!(file_id, "Discarded unindexed file"),
            Err(e) => warn!(file_id, "Failed to discard unindexed file: {e}"),
        }
    }
}

async fn find_or_create_assistant(api: &Api, settings: &OpenAISettings) -> anyhow::Result<String> {
    let page = api.get("/assistants?order=desc&limit=100").await?;
    if let Some(id) = find_assistant(&page, &settings.assistant_name) {
        info!(assistant_id = %id, "Reusing assistant");
        return Ok(id);
    }

    let created = api
        .post(
            "/assistants",
            &json!({
                "name": settings.assistant_name,
                "model": settings.model,
                "instructions": ASSISTANT_INSTRUCTIONS,
                "temperature": settings.temperature,
                "tools": [{
                    "type": "file_search",
                    "file_search": { "max_num_results": settings.max_num_results },
                }],
            }),
        )
        .await?;
    let id = string_field(&created, "id")?;
    info!(assistant_id = %id, "Created assistant");
    Ok(id)
}

async fn find_or_create_vector_store(
    api: &Api,
    settings: &OpenAISettings,
) -> anyhow::Result<String> {
    let page = api.get("/vector_stores?order=desc&limit=100").await?;
    if let Some(id) = find_by_name(&page, &settings.vector_store_name) {
        info!(vector_store_id = %id, "Reusing vector store");
        return Ok(id);
    }

    let created = api
        .post(
            "/vector_stores",
            &json!({
                "name": settings.vector_store_name,
                "expires_after": {
                    "anchor": "last_active_at",
                    "days": settings.vector_store_expiry_days,
                },
            }),
        )
        .await?;
    let id = string_field(&created, "id")?;
    info!(vector_store_id = %id, "Created vector store");
    Ok(id)
}

async fn attach_vector_store(
    api: &Api,
    assistant_id: &str,
    vector_store_id: &str,
) -> anyhow::Result<()> {
    api.post(
        &format!("/assistants/{assistant_id}"),
        &json!({
            "tool_resources": {
                "file_search": { "vector_store_ids": [vector_store_id] },
            },
        }),
    )
    .await?;
    Ok(())
}

#[async_trait]
impl KnowledgeService for OpenAIProvider {
    async fn create_conversation(&self) -> anyhow::Result<String> {
        let thread = self.api.post("/threads", &json!({})).await?;
        string_field(&thread, "id")
    }

    async fn upload_document(&self, name: &str, content: Vec<u8>) -> anyhow::Result<UploadReceipt> {
        let form = Form::new()
            .text("purpose", "assistants")
            .part("file", Part::bytes(content).file_name(name.to_string()));
        let file = Api::send(self.api.request(Method::POST, "/files").multipart(form)).await?;
        let file_id = string_field(&file, "id")?;
        debug!(name, file_id = %file_id, "File created");

        let indexed = self.index_file(&file_id).await;
        if !matches!(&indexed, Ok(receipt) if receipt.status == IndexStatus::Completed) {
            self.discard_file(&file_id).await;
        }
        indexed
    }

    /// Names of documents indexed in the vector store.
    ///
    /// Files that exist in the account but never finished indexing here are
    /// not part of the corpus, so a failed upload is retried by the next sync.
    async fn list_corpus_document_names(&self) -> anyhow::Result<HashSet<String>> {
        let indexed = self
            .api
            .list_all(
                &format!("/vector_stores/{}/files?filter=completed", self.vector_store_id),
                VECTOR_STORE_PAGE_SIZE,
            )
            .await?;
        let files = self
            .api
            .list_all("/files?purpose=assistants", FILES_PAGE_SIZE)
            .await?;

        let names = corpus_names(&files, &indexed);
        debug!(count = names.len(), "Listed remote documents");
        Ok(names)
    }

    async fn post_message(&self, remote_id: &str, role: Role, text: &str) -> anyhow::Result<()> {
        self.api
            .post(
                &format!("/threads/{remote_id}/messages"),
                &json!({ "role": role.as_str(), "content": text }),
            )
            .await?;
        Ok(())
    }

    async fn start_run(&self, remote_id: &str, request: &RunRequest) -> anyhow::Result<RunResult> {
        let mut raw = self
            .api
            .post(
                &format!("/threads/{remote_id}/runs"),
                &json!({
                    "assistant_id": self.assistant_id,
                    "instructions": request.instructions,
                    "max_prompt_tokens": request.max_prompt_tokens,
                    "max_completion_tokens": request.max_completion_tokens,
                }),
            )
            .await?;
        let id = string_field(&raw, "id")?;

        loop {
            let status = parse_run_status(&raw)?;
            if status.is_terminal() {
                return Ok(RunResult { id, status, raw });
            }
            debug!(run_id = %id, status = %status, "Waiting for run");
            sleep(self.poll_interval).await;
            raw = self
                .api
                .get(&format!("/threads/{remote_id}/runs/{id}"))
                .await?;
        }
    }

    async fn list_messages(&self, remote_id: &str) -> anyhow::Result<Vec<Message>> {
        let page = self
            .api
            .get(&format!("/threads/{remote_id}/messages?order=desc"))
            .await?;
        parse_messages(&page)
    }

    async fn resolve_document_name(&self, source_id: &str) -> anyhow::Result<String> {
        let file = self.api.get(&format!("/files/{source_id}")).await?;
        string_field(&file, "filename")
    }
}

fn string_field(value: &Value, key: &str) -> anyhow::Result<String> {
    value[key]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| anyhow::anyhow!("Invalid response format: missing {key}"))
}

/// Human readable part of an error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
        .unwrap_or_else(|| body.to_string())
}

fn find_by_name(page: &Value, name: &str) -> Option<String> {
    page["data"]
        .as_array()?
        .iter()
        .find(|item| item["name"].as_str() == Some(name))
        .and_then(|item| item["id"].as_str())
        .map(str::to_owned)
}

/// An assistant is reused only if its first tool is file search.
fn find_assistant(page: &Value, name: &str) -> Option<String> {
    page["data"]
        .as_array()?
        .iter()
        .find(|item| {
            item["name"].as_str() == Some(name)
                && item["tools"][0]["type"].as_str() == Some("file_search")
        })
        .and_then(|item| item["id"].as_str())
        .map(str::to_owned)
}

fn parse_page(page: &Value) -> anyhow::Result<(Vec<Value>, Option<String>, bool)> {
    let data = page["data"]
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid response format: missing data"))?;

    let last_id = data
        .last()
        .and_then(|item| item["id"].as_str())
        .map(str::to_owned);
    let has_more = page["has_more"].as_bool().unwrap_or(false);

    Ok((data.clone(), last_id, has_more))
}

/// File names of the account files whose id is indexed in the vector store.
fn corpus_names(files: &[Value], indexed: &[Value]) -> HashSet<String> {
    let indexed: HashSet<&str> = indexed
        .iter()
        .filter(|entry| entry["status"].as_str() == Some("completed"))
        .filter_map(|entry| entry["id"].as_str())
        .collect();

    files
        .iter()
        .filter(|file| file["id"].as_str().is_some_and(|id| indexed.contains(id)))
        .filter_map(|file| file["filename"].as_str().map(str::to_owned))
        .collect()
}

fn parse_upload_receipt(entry: &Value) -> anyhow::Result<UploadReceipt> {
    let status: IndexStatus = serde_json::from_value(entry["status"].clone())?;
    Ok(UploadReceipt {
        file_id: string_field(entry, "id")?,
        status,
        usage_bytes: entry["usage_bytes"].as_u64().unwrap_or(0),
    })
}

fn parse_run_status(run: &Value) -> anyhow::Result<RunStatus> {
    Ok(serde_json::from_value(run["status"].clone())?)
}

/// Flatten message pages into core messages, keeping file citations only.
fn parse_messages(page: &Value) -> anyhow::Result<Vec<Message>> {
    let data = page["data"]
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid response format: missing data"))?;

    data.iter()
        .map(|message| {
            let role: Role = serde_json::from_value(message["role"].clone())?;
            let mut text = String::new();
            let mut annotations = Vec::new();

            for part in message["content"].as_array().into_iter().flatten() {
                if part["type"].as_str() != Some("text") {
                    continue;
                }
                text.push_str(part["text"]["value"].as_str().unwrap_or_default());

                for annotation in part["text"]["annotations"].as_array().into_iter().flatten() {
                    if annotation["type"].as_str() != Some("file_citation") {
                        continue;
                    }
                    let Some(source_id) = annotation["file_citation"]["file_id"].as_str() else {
                        continue;
                    };
                    annotations.push(Annotation {
                        text: annotation["text"].as_str().unwrap_or_default().to_string(),
                        source_id: source_id.to_string(),
                        start_index: index_field(annotation, "start_index"),
                        end_index: index_field(annotation, "end_index"),
                    });
                }
            }

            Ok(Message {
                role,
                text,
                annotations,
            })
        })
        .collect()
}

fn index_field(value: &Value, key: &str) -> Option<usize> {
    value[key].as_u64().and_then(|n| usize::try_from(n).ok())
}
