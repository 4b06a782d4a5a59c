//! CRP registration lookup against the CFP national registry.
//!
//! CRP numbers come in as free text ("04/44606", "CRP 04 44606"); parsing
//! and the external lookup are separated so the parser stays testable
//! without the network.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const CFP_SEARCH_URL: &str = "https://cadastro.cfp.org.br/api/profissionais/pesquisar";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct CfpLookup {
    pub valid: bool,
    pub name: Option<String>,
    pub status: Option<String>,
    pub region: Option<String>,
    pub error: Option<String>,
}

impl CfpLookup {
    fn failure(error: &str) -> Self {
        Self {
            valid: false,
            name: None,
            status: None,
            region: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchPayload {
    registro: String,
    uf: String,
}

#[derive(Debug, Deserialize)]
struct Professional {
    #[serde(rename = "Nome", default)]
    nome: Option<String>,
    #[serde(default)]
    situacao: Option<String>,
    #[serde(default)]
    nomeregional: Option<String>,
}

/// Client for the CFP professional-search endpoint
#[derive(Debug)]
pub struct CfpClient {
    http: reqwest::Client,
    search_url: String,
}

impl CfpClient {
    /// Client pointed at the national registry
    pub fn registry() -> Result<Self, reqwest::Error> {
        Self::new(CFP_SEARCH_URL)
    }

    pub fn new(search_url: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            search_url: search_url.to_string(),
        })
    }

    /// Query the registry for one registration number within a region.
    /// Network problems are reported in-band, never as an Err.
    pub async fn lookup(&self, registro: &str, uf: &str) -> CfpLookup {
        let payload = SearchPayload {
            registro: registro.chars().filter(|c| c.is_ascii_digit()).collect(),
            uf: uf.chars().filter(|c| c.is_ascii_digit()).collect(),
        };
        info!(
            "Consultando CFP para CRP {} na região {}",
            payload.registro, payload.uf
        );

        let response = self
            .http
            .post(&self.search_url)
            .header("Referer", "https://cadastro.cfp.org.br/")
            .header("User-Agent", USER_AGENT)
            .json(&payload)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!("Erro ao consultar CFP: {}", e);
                return CfpLookup::failure("Serviço de consulta CFP temporariamente indisponível");
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("CFP API retornou status {}", status);
            return CfpLookup::failure(&format!(
                "Erro na consulta externa (Status {})",
                status.as_u16()
            ));
        }

        let professionals: Vec<Professional> = match response.json().await {
            Ok(list) => list,
            Err(e) => {
                warn!("Erro ao consultar CFP: {}", e);
                return CfpLookup::failure("Serviço de consulta CFP temporariamente indisponível");
            }
        };

        match professionals.into_iter().next() {
            Some(prof) => CfpLookup {
                valid: true,
                name: prof.nome,
                status: prof.situacao,
                region: prof.nomeregional,
                error: None,
            },
            None => CfpLookup::failure("Profissional não encontrado no CFP"),
        }
    }
}

/// Extract (region, number) from user input like "04/44606" or
/// "CRP 04 44606". The region is zero-padded to two digits.
pub fn parse_crp_input(input: &str) -> Option<(String, String)> {
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }

        // Leading digit run; the region is its last two digits at most
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let run_end = i;

        if i < chars.len() && (chars[i] == '/' || chars[i] == ' ') {
            let sep = i;
            let number_start = sep + 1;
            let mut j = number_start;
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            if j > number_start {
                let region_start = run_end.saturating_sub(2).max(start);
                let region: String = chars[region_start..run_end].iter().collect();
                let number: String = chars[number_start..j].iter().collect();
                let region = if region.len() == 1 {
                    format!("0{}", region)
                } else {
                    region
                };
                return Some((region, number));
            }
        }
    }

    None
}
