//! Text normalization for the sparse index and the semantic chunker.
//!
//! The same preprocessing runs over indexed chunks and over incoming
//! questions, so both sides of a BM25 lookup see identical token streams.
//! The corpus is Brazilian legal text, hence the Portuguese stopword list.

/// Portuguese stopwords (NLTK set).
const PORTUGUESE_STOPWORDS: &[&str] = &[
    "a", "à", "ao", "aos", "aquela", "aquelas", "aquele", "aqueles", "aquilo", "as", "às", "até",
    "com", "como", "da", "das", "de", "dela", "delas", "dele", "deles", "depois", "do", "dos", "e",
    "é", "ela", "elas", "ele", "eles", "em", "entre", "era", "eram", "éramos", "essa", "essas",
    "esse", "esses", "esta", "está", "estamos", "estão", "estar", "estas", "estava", "estavam",
    "estávamos", "este", "esteja", "estejam", "estejamos", "estes", "esteve", "estive",
    "estivemos", "estiver", "estivera", "estiveram", "estivéramos", "estiverem", "estivermos",
    "estivesse", "estivessem", "estivéssemos", "estou", "eu", "foi", "fomos", "for", "fora",
    "foram", "fôramos", "forem", "formos", "fosse", "fossem", "fôssemos", "fui", "há", "haja",
    "hajam", "hajamos", "hão", "havemos", "haver", "hei", "houve", "houvemos", "houver",
    "houvera", "houverá", "houveram", "houvéramos", "houverão", "houverei", "houverem",
    "houveremos", "houveria", "houveriam", "houveríamos", "houvermos", "houvesse", "houvessem",
    "houvéssemos", "isso", "isto", "já", "lhe", "lhes", "mais", "mas", "me", "mesmo", "meu",
    "meus", "minha", "minhas", "muito", "na", "não", "nas", "nem", "no", "nos", "nós", "nossa",
    "nossas", "nosso", "nossos", "num", "numa", "o", "os", "ou", "para", "pela", "pelas", "pelo",
    "pelos", "por", "qual", "quando", "que", "quem", "são", "se", "seja", "sejam", "sejamos",
    "sem", "ser", "será", "serão", "serei", "seremos", "seria", "seriam", "seríamos", "seu",
    "seus", "só", "somos", "sou", "sua", "suas", "também", "te", "tem", "têm", "temos", "tenha",
    "tenham", "tenhamos", "tenho", "terá", "terão", "terei", "teremos", "teria", "teriam",
    "teríamos", "teu", "teus", "teve", "tinha", "tinham", "tínhamos", "tive", "tivemos", "tiver",
    "tivera", "tiveram", "tivéramos", "tiverem", "tivermos", "tivesse", "tivessem", "tivéssemos",
    "tu", "tua", "tuas", "um", "uma", "você", "vocês", "vos",
];

fn is_stopword(token: &str) -> bool {
    PORTUGUESE_STOPWORDS.contains(&token)
}

/// Tokenizes text for BM25: lowercase, strip punctuation, drop stopwords and
/// anything non-alphabetic (numbers, section markers, leftover symbols).
pub fn preprocess(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();
    stripped
        .split_whitespace()
        .filter(|t| t.chars().all(|c| c.is_alphabetic()))
        .filter(|t| !is_stopword(t))
        .map(|t| t.to_string())
        .collect()
}

/// Splits text into sentences for the semantic chunker. Terminators are `.`,
/// `!`, `?` and newlines; empty segments are dropped. Deterministic, no
/// language model involved.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '.' | '!' | '?' => {
                current.push(c);
                push_sentence(&mut sentences, &mut current);
            }
            '\n' => push_sentence(&mut sentences, &mut current),
            _ => current.push(c),
        }
    }
    push_sentence(&mut sentences, &mut current);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_punctuation() {
        let tokens = preprocess("O Artigo, DISPÕE: sobre LICITAÇÃO!");
        assert_eq!(tokens, vec!["artigo", "dispõe", "sobre", "licitação"]);
    }

    #[test]
    fn drops_stopwords_and_numbers() {
        let tokens = preprocess("a lei 8666 de contratos e o edital");
        assert_eq!(tokens, vec!["lei", "contratos", "edital"]);
    }

    #[test]
    fn empty_and_symbol_only_input_yields_no_tokens() {
        assert!(preprocess("").is_empty());
        assert!(preprocess("--- ;;; 123 !!!").is_empty());
    }

    #[test]
    fn identical_text_tokenizes_identically() {
        let text = "Modalidades de licitação previstas na lei.";
        assert_eq!(preprocess(text), preprocess(text));
    }

    #[test]
    fn splits_on_terminators_and_newlines() {
        let sentences = split_sentences("Primeira frase. Segunda frase!\nTerceira linha");
        assert_eq!(
            sentences,
            vec!["Primeira frase.", "Segunda frase!", "Terceira linha"]
        );
    }

    #[test]
    fn blank_lines_produce_no_sentences() {
        assert!(split_sentences("\n\n   \n").is_empty());
    }
}
