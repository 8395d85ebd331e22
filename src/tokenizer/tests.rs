use super::*;

#[test]
fn counts_scale_with_words() {
    let tokenizer = HeuristicTokenizer;

    assert_eq!(tokenizer.count(""), 0);
    assert_eq!(tokenizer.count("   \n\t  "), 0);
    assert_eq!(tokenizer.count("hello world"), 2);

    let short = tokenizer.count("A short sentence.");
    let long = tokenizer.count("A considerably longer sentence with many more words in it.");
    assert!(long > short);
}

#[test]
fn punctuation_adds_tokens() {
    let tokenizer = HeuristicTokenizer;

    let plain = tokenizer.count("one two three four five six seven eight nine ten");
    let punctuated =
        tokenizer.count("one, two, three, four, five; six, seven, eight, nine, ten!?!");
    assert!(punctuated > plain);
}

#[test]
fn single_word_is_at_least_one_token() {
    let tokenizer = HeuristicTokenizer;
    assert!(tokenizer.count("word") >= 1);
}
