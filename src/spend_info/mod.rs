mod funding;

pub(crate) use funding::FundingSpendInfo;
