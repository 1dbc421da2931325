//! SeaORM Entity for ordpool_stats table
//! One row per block hash with every aggregate counter of the block

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ordpool_stats")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub hash: String,
    pub height: i32,

    pub amounts_atomical: i32,
    pub amounts_atomical_mint: i32,
    pub amounts_atomical_transfer: i32,
    pub amounts_atomical_update: i32,

    pub amounts_cat21: i32,
    pub amounts_cat21_mint: i32,
    pub amounts_cat21_transfer: i32,

    pub amounts_inscription: i32,
    pub amounts_inscription_mint: i32,
    pub amounts_inscription_transfer: i32,
    pub amounts_inscription_burn: i32,

    pub amounts_rune: i32,
    pub amounts_rune_etch: i32,
    pub amounts_rune_mint: i32,
    pub amounts_rune_cenotaph: i32,
    pub amounts_rune_transfer: i32,
    pub amounts_rune_burn: i32,

    pub amounts_brc20: i32,
    pub amounts_brc20_deploy: i32,
    pub amounts_brc20_mint: i32,
    pub amounts_brc20_transfer: i32,

    pub amounts_src20: i32,
    pub amounts_src20_deploy: i32,
    pub amounts_src20_mint: i32,
    pub amounts_src20_transfer: i32,

    pub fees_rune_mints: i64,
    pub fees_non_uncommon_rune_mints: i64,
    pub fees_brc20_mints: i64,
    pub fees_src20_mints: i64,
    pub fees_cat21_mints: i64,
    pub fees_atomicals: i64,
    pub fees_inscription_mints: i64,

    pub inscriptions_total_envelope_size: i64,
    pub inscriptions_total_content_size: i64,
    pub inscriptions_largest_envelope_size: i64,
    pub inscriptions_largest_content_size: i64,
    #[sea_orm(column_type = "Text", nullable)]
    pub inscriptions_largest_envelope_inscription_id: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub inscriptions_largest_content_inscription_id: Option<String>,
    pub inscriptions_average_envelope_size: i64,
    pub inscriptions_average_content_size: i64,

    #[sea_orm(column_type = "String(Some(20))", nullable)]
    pub runes_most_active_mint: Option<String>,
    #[sea_orm(column_type = "String(Some(20))", nullable)]
    pub runes_most_active_non_uncommon_mint: Option<String>,
    #[sea_orm(column_type = "String(Some(20))", nullable)]
    pub brc20_most_active_mint: Option<String>,
    #[sea_orm(column_type = "String(Some(20))", nullable)]
    pub src20_most_active_mint: Option<String>,

    pub analyser_version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
