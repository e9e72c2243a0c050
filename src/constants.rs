/// Remote locations and fixed names shared across pipeline stages

// Open-data directory trees published by ANS
pub const STATEMENTS_BASE_URL: &str =
    "https://dadosabertos.ans.gov.br/FTP/PDA/demonstracoes_contabeis/";
pub const REGISTRY_BASE_URL: &str =
    "https://dadosabertos.ans.gov.br/FTP/PDA/operadoras_de_plano_de_saude_ativas/";

pub const DEFAULT_MAX_PERIODS: usize = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub const USER_AGENT: &str = concat!("ans_etl/", env!("CARGO_PKG_VERSION"));

// Suffixes used when reading directory listings
pub const DIRECTORY_SUFFIX: &str = "/";
pub const ARCHIVE_SUFFIX: &str = ".zip";
pub const TABULAR_SUFFIX: &str = ".csv";

/// Marks quarterly statement archives, e.g. `1T2024.zip`
pub const PERIOD_MARKER: &str = "T20";

/// Entry suffixes (lower-cased) worth extracting from an archive
pub const RELEVANT_ENTRY_SUFFIXES: [&str; 3] = [".csv", ".xlsx", ".txt"];

/// Account codes of the expense class start with this digit
pub const EXPENSE_ACCOUNT_PREFIX: char = '4';

pub const FIELD_DELIMITER: u8 = b';';

// Placeholder applied when a registry id has no operator
pub const UNKNOWN_OPERATOR_NAME: &str = "UNKNOWN OPERATOR/INACTIVE";
pub const UNKNOWN_JURISDICTION: &str = "ND";

/// Shown in the dashboard summary when no operator matches a legal name
pub const NO_REGISTRY_ID: &str = "N/D";
pub const SUMMARY_TOP_N: usize = 5;

// File layout under the data directory
pub const RAW_DIR: &str = "raw";
pub const EXTRACTED_DIR: &str = "extracted";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const AUXILIARY_DIR: &str = "auxiliary";
pub const REGISTRY_FILE: &str = "operadoras.csv";
pub const CONSOLIDATED_FILE: &str = "consolidado_despesas.csv";
pub const ENRICHED_FILE: &str = "consolidado_despesas_final.csv";
pub const AGGREGATED_FILE: &str = "despesas_agregadas.csv";
pub const SUMMARY_FILE: &str = "dashboard_stats.json";

// Output headers
pub const CONSOLIDATED_HEADER: [&str; 6] =
    ["REG_ANS", "RazaoSocial", "Trimestre", "Ano", "Valor", "Descricao"];
pub const ENRICHED_HEADER: [&str; 10] = [
    "REG_ANS",
    "CNPJ",
    "RazaoSocial",
    "Modalidade",
    "UF",
    "Trimestre",
    "Ano",
    "Valor",
    "Descricao",
    "CNPJ_Valido",
];
pub const AGGREGATED_HEADER: [&str; 6] = [
    "RazaoSocial",
    "UF",
    "ValorTotal",
    "MediaTrimestral",
    "DesvioPadrao",
    "QtdRegistros",
];
