//! Model-backed clinical writing: session analysis and CFP-compliant
//! psychological documents.
//!
//! Prompts enforce conditional, non-deterministic clinical language per the
//! CFP resolutions (01/2009 registro documental, 06/2019 documentos
//! psicológicos). The model answers in JSON; decoding is tolerant of missing
//! keys so a partial answer still produces a usable draft.

use serde::Serialize;
use serde_json::Value;

use crate::llm::{ChatModel, LlmError};
use crate::models::{PatientRecord, ProfileRecord, SessionRecord};

/// Structured outcome of a session analysis
#[derive(Debug, Clone, Serialize)]
pub struct SessionAnalysis {
    pub registro_descritivo: String,
    pub hipoteses_clinicas: String,
    pub direcoes_intervencao: String,
    pub temas_relevantes: Vec<String>,
}

fn analysis_system_prompt(approach: &str) -> String {
    format!(
        "Você é um assistente de apoio ao raciocínio clínico e à elaboração de prontuários e documentos psicológicos, \
         especialista na abordagem {approach}, com base nas normas éticas e técnicas do Conselho Federal de Psicologia (CFP), especialmente:\n\n\
         • Resolução CFP nº 01/2009 (registro documental obrigatório)\n\
         • Resolução CFP nº 06/2019 (elaboração de documentos psicológicos)\n\
         • Manual Orientativo de Registro e Elaboração de Documentos Psicológicos publicado pelo CFP.\n\n\
         Sua função é auxiliar o psicólogo(a) a organizar, qualificar e formular textos de prontuário, relatórios e \
         documentos psicológicos de acordo com os relatos do profissional no prontuário e na abordagem {approach}, \
         dando oportunidade para o profissional editar. Você sugere possibilidades diagnósticas e sugere intervenções \
         de acordo com a abordagem {approach}.\n\n\
         LINGUAGEM ÉTICA E TÉCNICA OBRIGATÓRIA:\n\
         Sempre use expressões condicionais e não conclusivas, como:\n\
         'observa-se', 'levanta-se hipótese', 'pode indicar', 'sugere possibilidade'.\n\
         Nunca use linguagem determinista, diagnóstica ou prescritiva.\n\n\
         Responda SEMPRE em JSON com as chaves:\n\
         - registro_descritivo (descrição factual dos eventos, verbatim importantes, afetos e comportamentos observados)\n\
         - hipoteses_clinicas (formulação aberta e condicional, conectada com a abordagem {approach}, sugerindo possibilidades diagnósticas)\n\
         - direcoes_intervencao (sugestões hipotéticas compatíveis com a abordagem {approach}, indicando possíveis intervenções)\n\
         - temas_relevantes (lista de strings com temas identificados)"
    )
}

const REGISTRO_PROMPT: &str = "Elabore um registro descritivo da sessão (5 a 10 linhas), documentando de forma factual e objetiva:\n\
- Os eventos relatados pelo paciente\n\
- Verbalizações importantes (verbatim quando relevante)\n\
- Afetos predominantes observados\n\
- Comportamentos não-verbais significativos\n\
Use linguagem técnica e factual, sem interpretações nesta seção.";

const HIPOTESES_PROMPT: &str = "Formule hipóteses clínicas de forma narrativa e condicional (NÃO use listas ou tópicos):\n\
1. Integre organicamente os conceitos teóricos mais pertinentes ao conteúdo trazido.\n\
2. Sugira possibilidades diagnósticas usando linguagem condicional ('pode indicar', 'sugere', 'observa-se padrão compatível com').\n\
3. Se houver crise de identidade ou vazio existencial, considere perspectivas existenciais (sentido, responsabilidade).\n\
4. Se houver material onírico ou simbólico rico, considere aspectos arquetípicos e simbólicos.\n\
5. Para conflitos relacionais, dinâmicas de desejo ou mecanismos de defesa, considere perspectivas psicodinâmicas.\n\
6. Evite frases clichês. Prefira construções como 'Observa-se...', 'Levanta-se a hipótese de...', 'O discurso sugere...'.\n\
Escreva um texto fluido, elegante e clinicamente preciso.";

const INTERVENCOES_PROMPT: &str = "Sugira direções de intervenção de forma hipotética e condicional:\n\
1. Apresente possibilidades de intervenção compatíveis com as hipóteses levantadas.\n\
2. Use linguagem sugestiva: 'Pode-se considerar', 'Sugere-se explorar', 'Seria pertinente investigar'.\n\
3. Indique técnicas ou abordagens que possam ser úteis, sem prescrever.\n\
4. Mantenha o tom de sugestão, deixando a decisão final ao psicólogo responsável.\n\
Escreva de forma narrativa e profissional.";

fn string_field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn themes_field(data: &Value) -> Vec<String> {
    match data.get("temas_relevantes") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.to_string()],
    }
}

/// Analyze a session transcript (or free text) into the four CFP record
/// fields, written in the practitioner's theoretical approach
pub async fn analyze_session_text(
    model: &dyn ChatModel,
    approach: &str,
    label: &str,
    text: &str,
) -> Result<SessionAnalysis, LlmError> {
    let prompt = format!(
        "{}\n\n{}\n\n{}\n\n{}\n\n{} completa da sessão:\n{}\n\nResponda apenas em JSON.",
        analysis_system_prompt(approach),
        REGISTRO_PROMPT,
        HIPOTESES_PROMPT,
        INTERVENCOES_PROMPT,
        label,
        text
    );

    let data = model.generate_json(&prompt).await?;
    Ok(SessionAnalysis {
        registro_descritivo: string_field(&data, "registro_descritivo"),
        hipoteses_clinicas: string_field(&data, "hipoteses_clinicas"),
        direcoes_intervencao: string_field(&data, "direcoes_intervencao"),
        temas_relevantes: themes_field(&data),
    })
}

/// Recognized psychological document types (Resolução CFP nº 06/2019)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    RegistroDocumental,
    Relatorio,
    Laudo,
    Parecer,
    Declaracao,
    Atestado,
}

impl DocumentType {
    /// Unrecognized values fall back to the session record type
    pub fn from_slug(slug: &str) -> Self {
        match slug {
            "relatorio" => Self::Relatorio,
            "laudo" => Self::Laudo,
            "parecer" => Self::Parecer,
            "declaracao" => Self::Declaracao,
            "atestado" => Self::Atestado,
            _ => Self::RegistroDocumental,
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Self::RegistroDocumental => "registro_documental",
            Self::Relatorio => "relatorio",
            Self::Laudo => "laudo",
            Self::Parecer => "parecer",
            Self::Declaracao => "declaracao",
            Self::Atestado => "atestado",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::RegistroDocumental => "Registro Documental de Sessão",
            Self::Relatorio => "Relatório Psicológico",
            Self::Laudo => "Laudo Psicológico",
            Self::Parecer => "Parecer Psicológico",
            Self::Declaracao => "Declaração",
            Self::Atestado => "Atestado Psicológico",
        }
    }

    /// Section keys mandated for this document type, in rendering order
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::RegistroDocumental => {
                &["registro_descritivo", "hipoteses_clinicas", "direcoes_intervencao"]
            }
            Self::Relatorio => {
                &["identificacao", "descricao_demanda", "procedimento", "analise", "conclusao"]
            }
            Self::Laudo => &[
                "identificacao",
                "descricao_demanda",
                "procedimento",
                "analise",
                "diagnostico_provisorio",
                "conclusao",
            ],
            Self::Parecer => &["identificacao", "quesitos_analise", "analise_tecnica", "conclusao"],
            Self::Declaracao => &["finalidade", "informacoes_atendimento"],
            Self::Atestado => &["finalidade", "justificativa_ausencia_ou_aptidao"],
        }
    }

    fn structure(&self) -> String {
        self.fields()
            .iter()
            .map(|field| format!("- {field}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Display label for a section key, with a Title Case fallback for
    /// keys outside the known set
    pub fn field_label(key: &str) -> String {
        let known = match key {
            "registro_descritivo" => Some("Registro Descritivo"),
            "hipoteses_clinicas" => Some("Hipóteses Clínicas"),
            "direcoes_intervencao" => Some("Direções de Intervenção"),
            "descricao_demanda" => Some("Descrição da Demanda"),
            "procedimento" => Some("Procedimento"),
            "analise" => Some("Análise"),
            "conclusao" => Some("Conclusão"),
            "diagnostico_provisorio" => Some("Diagnóstico Provisório"),
            "quesitos_analise" => Some("Quesitos de Análise"),
            "analise_tecnica" => Some("Análise Técnica"),
            "finalidade" => Some("Finalidade"),
            "informacoes_atendimento" => Some("Informações de Atendimento"),
            "justificativa_ausencia_ou_aptidao" => Some("Justificativa"),
            _ => None,
        };
        match known {
            Some(label) => label.to_string(),
            None => key
                .split('_')
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Ordered document sections as returned by the model
#[derive(Debug, Clone, Serialize)]
pub struct DocumentContent {
    pub sections: Vec<(String, String)>,
}

impl DocumentContent {
    pub fn to_json(&self) -> Value {
        let mut object = serde_json::Map::new();
        for (key, value) in &self.sections {
            object.insert(key.clone(), Value::String(value.clone()));
        }
        Value::Object(object)
    }
}

/// Compose a psychological document from a session and patient, in the
/// structure mandated for `document_type`
pub async fn compose_document(
    model: &dyn ChatModel,
    document_type: DocumentType,
    session: &SessionRecord,
    patient: &PatientRecord,
    approach: &str,
) -> Result<DocumentContent, LlmError> {
    let base_content = session
        .transcription
        .as_deref()
        .or(session.summary.as_deref())
        .unwrap_or_default();
    let insights = match &session.insights {
        Some(insights) => insights.clone(),
        None => format!(
            "{} {}",
            session.hipoteses_clinicas.as_deref().unwrap_or_default(),
            session.direcoes_intervencao.as_deref().unwrap_or_default()
        ),
    };

    let system = format!(
        "Você é um assistente especializado em redação de documentos psicológicos conforme as normas do \
         Conselho Federal de Psicologia (CFP), especialmente a Resolução CFP nº 06/2019.\
         Você redige na abordagem {approach}.\
         Use linguagem ética, condicional e técnica. NUNCA seja determinista."
    );
    let prompt = format!(
        "{}\n\n\
         Tipo de Documento: {}\n\
         Dados do Paciente: {}\n\
         Abordagem do Terapeuta: {}\n\
         Conteúdo Base da Sessão: {}\n\
         Hipóteses e Direções: {}\n\n\
         Gere um JSON com os campos correspondentes a esta estrutura:\n{}\n\n\
         Instruções Adicionais:\n\
         1. Identificação: Nome, finalidade, solicitante (se não houver, use 'A própria pessoa').\n\
         2. Analise: Integre os dados com a abordagem {}.\n\
         3. Conclusão: Sempre condicional, sugerindo encaminhamentos ou próximos passos.",
        system,
        document_type.slug(),
        patient.name,
        approach,
        base_content,
        insights,
        document_type.structure(),
        approach
    );

    let data = model.generate_json(&prompt).await?;
    // Keep only the mandated sections, in their mandated order; the
    // generator occasionally adds keys outside the structure
    let sections = match data {
        Value::Object(mut map) => document_type
            .fields()
            .iter()
            .filter_map(|&key| {
                let text = match map.remove(key)? {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Some((key.to_string(), text))
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(DocumentContent { sections })
}

/// Plain-text insights block stored alongside the structured fields for
/// older readers of the sessions table
pub fn legacy_insights(
    hipoteses_clinicas: &str,
    direcoes_intervencao: &str,
    temas: &[String],
) -> String {
    format!(
        "{}\n\n{}\n\nTemas recorrentes: {}",
        hipoteses_clinicas,
        direcoes_intervencao,
        temas.join(", ")
    )
}

pub fn approach_of(profile: Option<&ProfileRecord>) -> String {
    profile
        .map(|p| p.approach().to_string())
        .unwrap_or_else(|| "Integrativa".to_string())
}
