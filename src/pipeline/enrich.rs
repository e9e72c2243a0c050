use super::checksum::is_valid_tax_id;
use super::delimited_writer;
use super::normalize::read_consolidated;
use super::registry::OperatorRegistry;
use crate::constants::{ENRICHED_HEADER, UNKNOWN_JURISDICTION, UNKNOWN_OPERATOR_NAME};
use crate::error::Result;
use crate::metrics::PipelineMetrics;
use crate::types::{EnrichedRecord, ExpenseRecord};
use std::path::Path;
use tracing::{info, instrument};

#[derive(Debug, Default)]
pub struct EnrichReport {
    pub records: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub valid_tax_ids: usize,
}

/// Joins one expense record with its operator. Unknown registry ids get the
/// placeholder operator and are never marked valid.
pub fn enrich_record(expense: &ExpenseRecord, registry: &OperatorRegistry) -> EnrichedRecord {
    match registry.get(&expense.registry_id) {
        Some(operator) => EnrichedRecord {
            expense: expense.clone(),
            tax_id: operator.tax_id.clone(),
            legal_name: operator.legal_name.clone(),
            modality: operator.modality.clone(),
            jurisdiction: operator.jurisdiction.clone(),
            tax_id_valid: is_valid_tax_id(&operator.tax_id),
        },
        None => EnrichedRecord {
            expense: expense.clone(),
            tax_id: String::new(),
            legal_name: UNKNOWN_OPERATOR_NAME.to_string(),
            modality: String::new(),
            jurisdiction: UNKNOWN_JURISDICTION.to_string(),
            tax_id_valid: false,
        },
    }
}

pub fn enrich(expenses: &[ExpenseRecord], registry: &OperatorRegistry) -> Vec<EnrichedRecord> {
    expenses
        .iter()
        .map(|expense| enrich_record(expense, registry))
        .collect()
}

/// Reads the consolidated file, enriches every row and writes the enriched
/// file. An unreadable consolidated file is an error.
#[instrument(skip(registry), fields(operators = registry.len()))]
pub fn enrich_file(
    consolidated_path: &Path,
    enriched_path: &Path,
    registry: &OperatorRegistry,
) -> Result<EnrichReport> {
    let expenses = read_consolidated(consolidated_path)?;
    let mut writer = delimited_writer(enriched_path)?;
    writer.write_record(ENRICHED_HEADER)?;

    let mut report = EnrichReport::default();
    for expense in &expenses {
        let matched = registry.get(&expense.registry_id).is_some();
        let enriched = enrich_record(expense, registry);
        writer.write_record(enriched.to_row())?;

        report.records += 1;
        if matched {
            report.matched += 1;
        } else {
            report.unmatched += 1;
        }
        if enriched.tax_id_valid {
            report.valid_tax_ids += 1;
        }
    }
    writer.flush()?;

    PipelineMetrics::record_enriched(
        report.valid_tax_ids,
        report.matched - report.valid_tax_ids,
        report.unmatched,
    );
    info!(
        "Enrichment finished: {} records ({} without operator, {} valid tax ids) -> {}",
        report.records,
        report.unmatched,
        report.valid_tax_ids,
        enriched_path.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperatorRecord;
    use std::fs;
    use tempfile::tempdir;

    fn expense(registry_id: &str) -> ExpenseRecord {
        ExpenseRecord {
            registry_id: registry_id.into(),
            period: "3T".into(),
            year: "2023".into(),
            value: "100.00".into(),
            description: "EVENTOS INDENIZAVEIS".into(),
        }
    }

    fn registry() -> OperatorRegistry {
        OperatorRegistry::from_records([
            OperatorRecord {
                registry_id: "111".into(),
                tax_id: "11222333000181".into(),
                legal_name: "ACME SAUDE".into(),
                jurisdiction: "SP".into(),
                modality: "Medicina de Grupo".into(),
            },
            OperatorRecord {
                registry_id: "222".into(),
                tax_id: "11222333000182".into(),
                legal_name: "BETA SAUDE".into(),
                jurisdiction: "RJ".into(),
                modality: "Cooperativa Medica".into(),
            },
        ])
    }

    #[test]
    fn hit_copies_operator_and_validates_tax_id() {
        let enriched = enrich(&[expense("111"), expense("222")], &registry());
        assert_eq!(enriched[0].legal_name, "ACME SAUDE");
        assert_eq!(enriched[0].jurisdiction, "SP");
        assert!(enriched[0].tax_id_valid);
        assert_eq!(enriched[1].tax_id, "11222333000182");
        assert!(!enriched[1].tax_id_valid);
    }

    #[test]
    fn miss_gets_placeholder_operator() {
        let enriched = enrich_record(&expense("404"), &registry());
        assert_eq!(enriched.legal_name, UNKNOWN_OPERATOR_NAME);
        assert_eq!(enriched.jurisdiction, UNKNOWN_JURISDICTION);
        assert_eq!(enriched.tax_id, "");
        assert_eq!(enriched.modality, "");
        assert!(!enriched.tax_id_valid);
        assert_eq!(enriched.expense, expense("404"));
    }

    #[test]
    fn enriched_file_layout() {
        let dir = tempdir().unwrap();
        let consolidated = dir.path().join("consolidado.csv");
        fs::write(
            &consolidated,
            "REG_ANS;RazaoSocial;Trimestre;Ano;Valor;Descricao\n111;;1T;2024;10.50;EVENTOS\n404;;1T;2024;1.00;\n",
        )
        .unwrap();
        let enriched = dir.path().join("final.csv");

        let report = enrich_file(&consolidated, &enriched, &registry()).unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.unmatched, 1);
        assert_eq!(report.valid_tax_ids, 1);
        assert_eq!(
            fs::read_to_string(&enriched).unwrap(),
            "REG_ANS;CNPJ;RazaoSocial;Modalidade;UF;Trimestre;Ano;Valor;Descricao;CNPJ_Valido\n\
             111;11222333000181;ACME SAUDE;Medicina de Grupo;SP;1T;2024;10.50;EVENTOS;true\n\
             404;;UNKNOWN OPERATOR/INACTIVE;;ND;1T;2024;1.00;;false\n"
        );
    }

    #[test]
    fn missing_consolidated_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = enrich_file(
            &dir.path().join("absent.csv"),
            &dir.path().join("final.csv"),
            &registry(),
        );
        assert!(result.is_err());
    }
}
