use rust_decimal::Decimal;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedOffer {
    pub is_offer: bool,
    pub amount: Option<Decimal>,
}

/// Words that mark a message as a purchase offer rather than a question
/// that merely mentions a price.
const INTENT_KEYWORDS: &[&str] = &[
    "offer",
    "pay",
    "accept",
    "take",
    "deal",
    "how about",
    "would you do",
    "would you take",
    "buy it for",
    "buy for",
    "willing to pay",
    "can you do",
    "give you",
    "i'll do",
    "i will do",
];

#[derive(Clone, Debug, Default)]
pub struct OfferExtractor;

impl OfferExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Pulls the first money amount out of free text and decides whether the
    /// message is an offer. Both a numeric match and an intent keyword are
    /// required, which misses offers phrased without a trigger word and can
    /// fire on sentences that restate a price; that is the accepted
    /// behavior of this heuristic. When a message carries several numbers,
    /// only the first one is used.
    pub fn extract(&self, message: &str) -> ExtractedOffer {
        let normalized = message.to_ascii_lowercase();
        let amount = first_amount(&normalized);
        let has_intent = INTENT_KEYWORDS.iter().any(|keyword| normalized.contains(keyword));

        ExtractedOffer { is_offer: amount.is_some() && has_intent, amount }
    }
}

/// First numeric match: optional leading `$`, thousands separators, and up
/// to two decimal places. Anything past the second fraction digit is left
/// unconsumed.
fn first_amount(text: &str) -> Option<Decimal> {
    let bytes = text.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        let starts_digit = bytes[index].is_ascii_digit();
        let starts_dollar = bytes[index] == b'$'
            && index + 1 < bytes.len()
            && bytes[index + 1].is_ascii_digit();

        if !starts_digit && !starts_dollar {
            index += 1;
            continue;
        }

        let mut cursor = if starts_digit { index } else { index + 1 };
        let mut raw = String::new();

        while cursor < bytes.len() && (bytes[cursor].is_ascii_digit() || bytes[cursor] == b',') {
            if bytes[cursor] != b',' {
                raw.push(bytes[cursor] as char);
            }
            cursor += 1;
        }

        if cursor + 1 < bytes.len() && bytes[cursor] == b'.' && bytes[cursor + 1].is_ascii_digit()
        {
            cursor += 1;
            raw.push('.');
            let mut fraction_digits = 0;
            while cursor < bytes.len() && bytes[cursor].is_ascii_digit() && fraction_digits < 2 {
                raw.push(bytes[cursor] as char);
                cursor += 1;
                fraction_digits += 1;
            }
        }

        if let Ok(amount) = raw.parse::<Decimal>() {
            return Some(amount);
        }

        index = cursor.max(index + 1);
    }

    None
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::OfferExtractor;

    fn dec(value: &str) -> Decimal {
        value.parse().expect("decimal literal")
    }

    #[test]
    fn recognizes_a_plain_offer() {
        let extracted = OfferExtractor::new().extract("I'll offer $80 for the bike");
        assert!(extracted.is_offer);
        assert_eq!(extracted.amount, Some(dec("80")));
    }

    #[test]
    fn price_mention_without_intent_is_not_an_offer() {
        let extracted = OfferExtractor::new().extract("Is $50 the final price?");
        assert!(!extracted.is_offer);
        assert_eq!(extracted.amount, Some(dec("50")));
    }

    #[test]
    fn intent_without_a_number_is_not_an_offer() {
        let extracted = OfferExtractor::new().extract("Would you take less for it?");
        assert!(!extracted.is_offer);
        assert_eq!(extracted.amount, None);
    }

    #[test]
    fn first_of_several_numbers_wins() {
        let extracted = OfferExtractor::new().extract("I can pay 75 now or 90 next week");
        assert!(extracted.is_offer);
        assert_eq!(extracted.amount, Some(dec("75")));
    }

    #[test]
    fn parses_thousands_separators_and_cents() {
        let extracted = OfferExtractor::new().extract("Willing to pay $1,250.50 cash today");
        assert!(extracted.is_offer);
        assert_eq!(extracted.amount, Some(dec("1250.50")));
    }

    #[test]
    fn stops_after_two_fraction_digits() {
        let extracted = OfferExtractor::new().extract("how about 99.999");
        assert_eq!(extracted.amount, Some(dec("99.99")));
    }

    #[test]
    fn handles_common_phrasings() {
        struct Case {
            text: &'static str,
            expect_offer: bool,
            expect_amount: Option<&'static str>,
        }

        let cases = vec![
            Case { text: "would you take $85?", expect_offer: true, expect_amount: Some("85") },
            Case { text: "how about 90 bucks", expect_offer: true, expect_amount: Some("90") },
            Case { text: "i can pay 100", expect_offer: true, expect_amount: Some("100") },
            Case { text: "deal at $95", expect_offer: true, expect_amount: Some("95") },
            Case { text: "ill give you 60 for it", expect_offer: true, expect_amount: Some("60") },
            Case { text: "can you do 1,000?", expect_offer: true, expect_amount: Some("1000") },
            Case { text: "i accept 94", expect_offer: true, expect_amount: Some("94") },
            Case { text: "buy it for 72.50", expect_offer: true, expect_amount: Some("72.50") },
            Case { text: "is it still available?", expect_offer: false, expect_amount: None },
            Case { text: "what's the lowest you'd go?", expect_offer: false, expect_amount: None },
            Case {
                text: "the listing says $100",
                expect_offer: false,
                expect_amount: Some("100"),
            },
            Case { text: "does it come with a charger?", expect_offer: false, expect_amount: None },
        ];

        let extractor = OfferExtractor::new();
        for (index, case) in cases.iter().enumerate() {
            let extracted = extractor.extract(case.text);
            assert_eq!(
                extracted.is_offer, case.expect_offer,
                "case {index} offer flag mismatch: {}",
                case.text
            );
            assert_eq!(
                extracted.amount,
                case.expect_amount.map(|raw| raw.parse().expect("decimal literal")),
                "case {index} amount mismatch: {}",
                case.text
            );
        }
    }

    #[test]
    fn extraction_is_pure() {
        let extractor = OfferExtractor::new();
        let first = extractor.extract("offer 80");
        let second = extractor.extract("offer 80");
        assert_eq!(first, second);
    }
}
