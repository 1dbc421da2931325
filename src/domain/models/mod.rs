pub mod block_cursor;
pub mod ordpool_stats;

pub use block_cursor::BlockCursor;
pub use ordpool_stats::{
    ActivityEncoding, Amounts, Fees, InscriptionSizes, OrdpoolStats, RuneStats, TokenActivity,
    TokenFamily, TokenStats, UNCOMMON_GOODS_RUNE_ID,
};
