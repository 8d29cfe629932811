#![no_main]
use libfuzzer_sys::fuzz_target;

use arbitrary::Arbitrary;

#[derive(Debug)]
pub struct LambdaInput {
    pub text: String,
}

impl<'a> Arbitrary<'a> for LambdaInput {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        // most random strings die in the lexer; start from a parameter so the
        //  fuzzer spends its time in the parser and translator
        let body: String = u.arbitrary()?;
        let text = format!("p => {}", body.chars().take(MAX_LAMBDA_LENGTH).collect::<String>());
        Ok(LambdaInput { text })
    }
}

const MAX_LAMBDA_LENGTH: usize = 10000;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = arbitrary::Unstructured::new(data).arbitrary::<LambdaInput>() {
        lambda_sql::fuzz_helper::translate_expr(&input.text);
    }
});
