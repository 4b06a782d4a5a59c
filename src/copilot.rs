//! Copilot conversation orchestrator.
//!
//! Persists the exchange in `copilot_conversations` / `copilot_messages`,
//! replays recent history to the model and drives the bounded
//! tool-execution loop. Turns within one conversation are serialized so two
//! concurrent requests cannot interleave their messages.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::llm::{ChatMessage, ChatModel, ToolCallResult};
use crate::models::{ConversationRecord, MessageRecord};
use crate::supabase::SupabaseClient;
use crate::tools::{self, ToolInvocation};

/// Ceiling on model round-trips within one request
pub const MAX_ITERATIONS: usize = 10;

/// Most recent messages replayed to the model as context
pub const HISTORY_LIMIT: usize = 20;

const FALLBACK_REPLY: &str =
    "Desculpe, ocorreu um erro ao processar sua mensagem. Tente novamente.";

/// One async mutex per live conversation; entries persist for the process
/// lifetime, which is bounded by the number of distinct conversations seen
#[derive(Default)]
pub struct ConversationLocks {
    inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationLocks {
    pub async fn acquire(&self, conversation_id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut map = match self.inner.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.entry(conversation_id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

fn system_prompt() -> String {
    let now = Utc::now()
        .with_timezone(&tools::brasilia_offset())
        .format("%Y-%m-%d %H:%M");
    format!(
        "\n# ASSISTENTE CLÍNICO E GESTOR v3.0 (CFP COMPLIANT)\n\n\
         Você é um assistente especializado em apoio ao raciocínio clínico, gestão de consultório e elaboração de documentos psicológicos, \
         operando estritamente sob as normas do Conselho Federal de Psicologia (CFP), especialmente as Resoluções 01/2009 e 06/2019.\n\n\
         Sua função é auxiliar o psicólogo(a) em duas frentes:\n\
         1. **Raciocínio Clínico e Documentação**: Apoiar na organização de prontuários e documentos, usando linguagem ética e técnica \
         (expressões condicionais como 'observa-se', 'sugere-se', 'levanta-se hipótese'). Você pode sugerir possibilidades diagnósticas \
         e intervenções baseadas na abordagem teórica do profissional.\n\
         2. **Gestão Administrativa**: Auxiliar no agendamento, cadastro de pacientes e registro de queixas usando as ferramentas disponíveis.\n\n\
         LINGUAGEM OBRIGATÓRIA:\n\
         - NUNCA seja determinista, diagnóstico ou prescritivo em tom conclusivo.\n\
         - Use sempre tom de apoio e sugestão para o profissional responsável.\n\n\
         **REFERÊNCIA DE TEMPO**:\n\
         - Data e Hora Atual do Usuário: {}\n\
         - Fuso Horário: Brasília (UTC-3)\n",
        now
    )
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub conversation_id: Uuid,
    pub reply: String,
}

async fn resolve_conversation(
    db: &SupabaseClient,
    actor: &AuthUser,
    conversation_id: Option<Uuid>,
) -> Result<Uuid, ApiError> {
    match conversation_id {
        Some(id) => {
            let conversation: Option<ConversationRecord> = db
                .from("copilot_conversations")
                .select("*")
                .eq("id", &id.to_string())
                .fetch_one()
                .await?;
            // Missing and foreign conversations look the same to the caller
            match conversation {
                Some(c) if c.user_id == actor.user_id => Ok(id),
                _ => Err(ApiError::NotFound(
                    "Conversa não encontrada ou acesso negado.".to_string(),
                )),
            }
        }
        None => {
            let created: ConversationRecord = db
                .insert(
                    "copilot_conversations",
                    &json!({ "user_id": actor.user_id, "title": "Nova Conversa" }),
                )
                .await?;
            Ok(created.id)
        }
    }
}

async fn recent_history(
    db: &SupabaseClient,
    conversation_id: Uuid,
) -> Result<Vec<MessageRecord>, ApiError> {
    let mut rows: Vec<MessageRecord> = db
        .from("copilot_messages")
        .select("*")
        .eq("conversation_id", &conversation_id.to_string())
        .order("created_at", true)
        .limit(HISTORY_LIMIT)
        .fetch()
        .await?;
    rows.reverse();
    Ok(rows)
}

/// Run one copilot turn: persist the user message, drive the model through
/// the tool loop and persist the assistant reply
pub async fn run_chat(
    db: &SupabaseClient,
    model: &Arc<dyn ChatModel>,
    locks: &ConversationLocks,
    actor: &AuthUser,
    conversation_id: Option<Uuid>,
    message: &str,
) -> Result<ChatOutcome, ApiError> {
    let conversation_id = resolve_conversation(db, actor, conversation_id).await?;
    let _guard = locks.acquire(conversation_id).await;

    db.insert::<_, MessageRecord>(
        "copilot_messages",
        &json!({
            "conversation_id": conversation_id,
            "role": "user",
            "content": message,
        }),
    )
    .await?;

    let history = recent_history(db, conversation_id).await?;

    let mut messages: Vec<ChatMessage> = history
        .iter()
        .map(|row| {
            if row.role == "user" {
                ChatMessage::User(row.content.clone())
            } else {
                ChatMessage::Assistant(row.content.clone())
            }
        })
        .collect();

    // The just-persisted message is normally the history tail already
    let tail_is_current = matches!(
        messages.last(),
        Some(ChatMessage::User(content)) if content == message
    );
    if !tail_is_current {
        messages.push(ChatMessage::User(message.to_string()));
    }

    let reply = drive_tool_loop(db, model.as_ref(), actor, &mut messages).await;

    db.insert::<_, MessageRecord>(
        "copilot_messages",
        &json!({
            "conversation_id": conversation_id,
            "role": "assistant",
            "content": reply,
        }),
    )
    .await?;

    // First exchange names the conversation; done off the request path
    if history.len() <= 2 {
        let db = db.clone();
        let model = Arc::clone(model);
        let message = message.to_string();
        tokio::spawn(async move {
            if let Err(e) = generate_title(&db, model.as_ref(), conversation_id, &message).await {
                warn!("Erro ao gerar título: {}", e);
            }
        });
    }

    Ok(ChatOutcome {
        conversation_id,
        reply,
    })
}

/// Exchange turns with the model, executing requested tools, until it
/// answers in text or the iteration ceiling is hit
async fn drive_tool_loop(
    db: &SupabaseClient,
    model: &dyn ChatModel,
    actor: &AuthUser,
    messages: &mut Vec<ChatMessage>,
) -> String {
    let system = system_prompt();
    let declarations = tools::declarations();

    for _ in 0..MAX_ITERATIONS {
        let turn = match model.chat(&system, messages, &declarations).await {
            Ok(turn) => turn,
            Err(e) => {
                error!("Erro no chat copilot: {}", e);
                return FALLBACK_REPLY.to_string();
            }
        };

        if turn.tool_calls.is_empty() {
            return turn.text.unwrap_or_else(|| FALLBACK_REPLY.to_string());
        }

        let mut results = Vec::with_capacity(turn.tool_calls.len());
        for call in &turn.tool_calls {
            info!("GEMINI TOOL CALL: {} | ARGS: {}", call.name, call.args);
            let output = match ToolInvocation::parse(&call.name, &call.args) {
                Ok(invocation) => invocation.execute(db, actor).await,
                Err(e) => e.to_result_string(&call.name),
            };
            results.push(ToolCallResult {
                name: call.name.clone(),
                output,
            });
        }

        messages.push(ChatMessage::AssistantToolCalls(turn.tool_calls));
        messages.push(ChatMessage::ToolResults(results));
    }

    error!("Limite de iterações de ferramentas atingido");
    FALLBACK_REPLY.to_string()
}

async fn generate_title(
    db: &SupabaseClient,
    model: &dyn ChatModel,
    conversation_id: Uuid,
    message: &str,
) -> Result<(), ApiError> {
    let prompt = format!(
        "Resuma a mensagem do usuário em um título curto de 3-5 palavras para uma conversa: {}",
        message
    );
    let title = model.generate_text(&prompt).await?;
    let title = title.trim().trim_matches('"');

    db.update::<_, ConversationRecord>(
        "copilot_conversations",
        &json!({ "title": title }),
        ("id", &conversation_id.to_string()),
    )
    .await?;
    Ok(())
}
