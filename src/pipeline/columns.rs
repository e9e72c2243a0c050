//! Header resolution for statement files whose column names changed across years.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRole {
    AccountCode,
    Value,
    RegistryId,
    Description,
}

impl ColumnRole {
    /// Accepted (upper-case) header names for this role
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            ColumnRole::AccountCode => &["CD_CONTA_CONTABIL", "CD_CONTA"],
            ColumnRole::Value => &["VL_SALDO_FINAL", "VALOR"],
            ColumnRole::RegistryId => &["REG_ANS"],
            ColumnRole::Description => &["DESCRICAO"],
        }
    }

    const ALL: [ColumnRole; 4] = [
        ColumnRole::AccountCode,
        ColumnRole::Value,
        ColumnRole::RegistryId,
        ColumnRole::Description,
    ];

    fn for_header(cell: &str) -> Option<ColumnRole> {
        let name = cell.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|role| role.aliases().contains(&name.as_str()))
    }
}

/// Zero-based column index per role. May be partial; see `has_mandatory`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    indices: HashMap<ColumnRole, usize>,
}

impl ColumnMap {
    pub fn get(&self, role: ColumnRole) -> Option<usize> {
        self.indices.get(&role).copied()
    }

    /// Account code and value are required to read expenses from a file
    pub fn has_mandatory(&self) -> bool {
        self.get(ColumnRole::AccountCode).is_some() && self.get(ColumnRole::Value).is_some()
    }
}

/// Maps header cells to roles. When several cells match one role the last wins.
pub fn map_columns<S: AsRef<str>>(header: &[S]) -> ColumnMap {
    let mut map = ColumnMap::default();
    for (index, cell) in header.iter().enumerate() {
        if let Some(role) = ColumnRole::for_header(cell.as_ref()) {
            map.indices.insert(role, index);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_aliases_in_any_case_and_position() {
        let header = [" descricao ", "vl_saldo_final", "DATA", " Cd_Conta_Contabil", "REG_ANS"];
        let map = map_columns(&header);
        assert_eq!(map.get(ColumnRole::AccountCode), Some(3));
        assert_eq!(map.get(ColumnRole::Value), Some(1));
        assert_eq!(map.get(ColumnRole::RegistryId), Some(4));
        assert_eq!(map.get(ColumnRole::Description), Some(0));
        assert!(map.has_mandatory());
    }

    #[test]
    fn every_alias_pair_resolves() {
        for account in ColumnRole::AccountCode.aliases() {
            for value in ColumnRole::Value.aliases() {
                let header = vec![format!("  {}", value.to_lowercase()), "X".into(), format!("{} ", account)];
                let map = map_columns(&header);
                assert_eq!(map.get(ColumnRole::Value), Some(0));
                assert_eq!(map.get(ColumnRole::AccountCode), Some(2));
            }
        }
    }

    #[test]
    fn last_matching_cell_wins() {
        let map = map_columns(&["CD_CONTA", "VALOR", "CD_CONTA_CONTABIL"]);
        assert_eq!(map.get(ColumnRole::AccountCode), Some(2));
    }

    #[test]
    fn missing_mandatory_role_is_reported_not_failed() {
        let map = map_columns(&["REG_ANS", "VALOR"]);
        assert!(!map.has_mandatory());
        assert_eq!(map.get(ColumnRole::RegistryId), Some(0));
        assert_eq!(map.get(ColumnRole::AccountCode), None);
    }
}
