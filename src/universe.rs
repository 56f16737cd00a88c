// =============================================================================
// Default instrument universe and macro indicators
// =============================================================================
//
// Index weights are shares of the Ibovespa; liquidity weights discount the
// thinner depositary receipts. The secondary set only enters aggregation when
// `include_secondary` is on.

use crate::types::{Instrument, MacroImpact, MacroIndicator};

pub fn default_primary() -> Vec<Instrument> {
    vec![
        Instrument::new("VALE", "Vale S.A.", 11.139, 1.0, false),
        Instrument::new("ITUB", "Itau Unibanco", 8.212, 0.9, false),
        Instrument::new("PBR", "Petrobras PN", 6.264, 1.0, false),
        Instrument::new("PBR-A", "Petrobras ON", 4.037, 1.0, false),
        Instrument::new("BBD", "Bradesco PN", 4.087, 0.8, false),
        Instrument::new("BBDO", "Bradesco ON", 1.002, 0.8, false),
    ]
}

pub fn default_secondary() -> Vec<Instrument> {
    vec![
        Instrument::new("ABEV", "Ambev", 2.431, 0.5, true),
        Instrument::new("ERJ", "Embraer", 2.794, 0.5, true),
    ]
}

pub fn default_macro_indicators() -> Vec<MacroIndicator> {
    vec![
        MacroIndicator::new("EWZ_CLOSE", "EWZ previous close", 2.5, MacroImpact::Direct),
        MacroIndicator::new("ES=F", "S&P 500 futures", 1.5, MacroImpact::Correlated),
        MacroIndicator::new("CL=F", "WTI crude", 1.0, MacroImpact::Sectoral),
        MacroIndicator::new("DXY", "Dollar index", 1.5, MacroImpact::Inverse),
        MacroIndicator::new("VIX", "CBOE volatility index", 1.0, MacroImpact::Volatility),
        MacroIndicator::new("GC=F", "Gold futures", 1.0, MacroImpact::Inverse),
        MacroIndicator::new("TIOC1", "Iron ore", 1.5, MacroImpact::Direct),
    ]
}
