//! PDF rendering for psychological documents and evolution reports.
//!
//! Layout is deliberately simple: Helvetica, letter pages, a downward
//! cursor with page breaks. The built-in fonts only cover WinAnsi, so text
//! is sanitized to Latin-1 before drawing (Portuguese accents survive,
//! anything else is dropped).

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};

use crate::documents::{DocumentContent, DocumentType};
use crate::models::{PatientRecord, ProfileRecord};
use crate::reports::PatientReport;

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("PDF rendering failed: {0}")]
    Render(String),
}

const PAGE_WIDTH: f32 = 215.9;
const PAGE_HEIGHT: f32 = 279.4;
const MARGIN_LEFT: f32 = 20.0;
const MARGIN_TOP: f32 = 20.0;
const MARGIN_BOTTOM: f32 = 20.0;

// Conservative line widths for Helvetica at the sizes used below
const BODY_WRAP: usize = 90;
const LINE_HEIGHT: f32 = 6.0;

/// Drop characters the built-in WinAnsi fonts cannot encode
fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| (*c as u32) < 0x100 && *c != '\r')
        .collect()
}

/// Greedy word wrap at `max_chars` columns; words longer than a line are
/// emitted as-is
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw_line in text.split('\n') {
        let mut current = String::new();
        for word in raw_line.split_whitespace() {
            if current.is_empty() {
                current = word.to_string();
            } else if current.len() + 1 + word.len() <= max_chars {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(current);
                current = word.to_string();
            }
        }
        lines.push(current);
    }
    lines
}

struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self, PdfError> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| PdfError::Render(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| PdfError::Render(e.to_string()))?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            y: PAGE_HEIGHT - MARGIN_TOP,
        })
    }

    fn ensure_room(&mut self, needed: f32) {
        if self.y - needed < MARGIN_BOTTOM {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN_TOP;
        }
    }

    fn title(&mut self, text: &str) {
        self.ensure_room(12.0);
        // rough centering for the title line
        let x = (PAGE_WIDTH - text.len() as f32 * 3.2).max(MARGIN_LEFT) / 2.0;
        self.layer
            .use_text(sanitize(text), 16.0, Mm(x), Mm(self.y), &self.bold);
        self.y -= 12.0;
    }

    fn heading(&mut self, text: &str) {
        self.ensure_room(10.0);
        self.y -= 4.0;
        self.layer
            .use_text(sanitize(text), 12.0, Mm(MARGIN_LEFT), Mm(self.y), &self.bold);
        self.y -= 8.0;
    }

    fn line(&mut self, text: &str) {
        self.ensure_room(LINE_HEIGHT);
        self.layer
            .use_text(sanitize(text), 11.0, Mm(MARGIN_LEFT), Mm(self.y), &self.regular);
        self.y -= LINE_HEIGHT;
    }

    fn paragraph(&mut self, text: &str) {
        for line in wrap(&sanitize(text), BODY_WRAP) {
            self.line(&line);
        }
        self.y -= 2.0;
    }

    fn spacer(&mut self, height: f32) {
        self.y -= height;
    }

    fn finish(self) -> Result<Vec<u8>, PdfError> {
        self.doc
            .save_to_bytes()
            .map_err(|e| PdfError::Render(e.to_string()))
    }
}

/// Render a psychological document to PDF, with identification up top and
/// the practitioner's signature block at the bottom
pub fn render_clinical_document(
    document_type: DocumentType,
    content: &DocumentContent,
    patient: &PatientRecord,
    session_date: &str,
    therapist: Option<&ProfileRecord>,
) -> Result<Vec<u8>, PdfError> {
    let mut writer = PageWriter::new(document_type.title())?;

    writer.title(document_type.title());
    writer.spacer(4.0);

    writer.heading("Identificação");
    writer.line(&format!("Nome: {}", patient.name));
    writer.line(&format!("Data: {}", session_date));

    for (key, value) in &content.sections {
        if key == "identificacao" || key == "id" {
            continue;
        }
        writer.heading(&DocumentType::field_label(key));
        writer.paragraph(value);
    }

    writer.spacer(14.0);
    if let Some(therapist) = therapist {
        writer.line(therapist.name.as_deref().unwrap_or("Terapeuta"));
        if let Some(crp) = &therapist.crp {
            writer.line(&format!("CRP: {}", crp));
        }
        if let Some(email) = &therapist.recovery_email {
            writer.line(email);
        }
        writer.spacer(8.0);
    }
    writer.line("_______________________________");
    writer.line("Assinatura do Profissional");

    writer.finish()
}

/// Render the evolution report to PDF: general statistics, sentiment
/// summary and the most common topics
pub fn render_patient_report(report: &PatientReport) -> Result<Vec<u8>, PdfError> {
    let mut writer = PageWriter::new("Relatório de Sessões Terapêuticas")?;

    writer.title("Relatório de Sessões Terapêuticas");
    writer.spacer(4.0);

    writer.heading(&format!("Paciente: {}", report.patient.name));
    if let Some(email) = &report.patient.email {
        writer.line(&format!("Email: {}", email));
    }

    writer.spacer(6.0);
    writer.heading("Período do Relatório:");
    writer.line(&format!(
        "De: {} até {}",
        report.period.start.as_deref().unwrap_or("N/A"),
        report.period.end.as_deref().unwrap_or("N/A")
    ));

    writer.spacer(4.0);
    writer.heading("Estatísticas Gerais:");
    writer.line(&format!("Total de Sessões: {}", report.sessions_count));
    if let Some(frequency) = &report.analysis.session_frequency {
        writer.line(&format!(
            "Média de Sessões por Semana: {:.1}",
            frequency.sessions_per_week
        ));
        let day = frequency
            .most_common_day
            .as_ref()
            .map(|d| d.day.as_str())
            .unwrap_or("N/A");
        writer.line(&format!("Dia Mais Comum: {}", day));
    }

    if let Some(sentiment) = &report.analysis.sentiment_trends {
        writer.spacer(6.0);
        writer.heading("Análise de Sentimento:");
        writer.line(&format!("Média de Sentimento: {:.2}", sentiment.average_score));
        writer.line(&format!("Tendência: {}", capitalize(&sentiment.trend)));
    }

    if !report.analysis.topics.is_empty() {
        writer.spacer(4.0);
        writer.heading("Tópicos Mais Comuns:");
        for topic in &report.analysis.topics {
            writer.line(&format!("{}: {}", capitalize(&topic.topic), topic.count));
        }
    }

    writer.finish()
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::build_patient_report;
    use uuid::Uuid;

    fn patient() -> PatientRecord {
        PatientRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "José Santos".to_string(),
            email: Some("jose@example.com".to_string()),
            phone: None,
            created_at: None,
        }
    }

    #[test]
    fn test_sanitize_keeps_portuguese() {
        assert_eq!(sanitize("Hipóteses Clínicas àçõ"), "Hipóteses Clínicas àçõ");
        assert_eq!(sanitize("ok \u{1F600} fim"), "ok  fim");
    }

    #[test]
    fn test_wrap_long_paragraph() {
        let text = "palavra ".repeat(40);
        let lines = wrap(&text, 30);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.len() <= 30));
    }

    #[test]
    fn test_wrap_preserves_newlines() {
        let lines = wrap("linha um\nlinha dois", 80);
        assert_eq!(lines, vec!["linha um", "linha dois"]);
    }

    #[test]
    fn test_render_clinical_document() {
        let content = DocumentContent {
            sections: vec![
                ("registro_descritivo".to_string(), "Observa-se relato de tensão.".to_string()),
                ("hipoteses_clinicas".to_string(), "Levanta-se a hipótese de...".to_string()),
            ],
        };
        let bytes = render_clinical_document(
            DocumentType::RegistroDocumental,
            &content,
            &patient(),
            "10/03/2025",
            None,
        )
        .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_render_patient_report() {
        let report = build_patient_report(patient(), &[], None, None);
        let bytes = render_patient_report(&report).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
