use crate::vm::class::field::FieldType;
use crate::vm::class::method::MethodDescriptor;

impl MethodDescriptor {
    fn parse_field_type(str: &str, is_parameter: bool) -> (Option<FieldType>, &str) {
        let rest = str.get(1..).unwrap_or("");
        match str.as_bytes().first() {
            Some(b'B') => (Some(FieldType::B), rest),
            Some(b'C') => (Some(FieldType::C), rest),
            Some(b'D') => (Some(FieldType::D), rest),
            Some(b'F') => (Some(FieldType::F), rest),
            Some(b'I') => (Some(FieldType::I), rest),
            Some(b'J') => (Some(FieldType::J), rest),
            Some(b'S') => (Some(FieldType::S), rest),
            Some(b'Z') => (Some(FieldType::Z), rest),
            Some(b'L') => {
                match rest.find(';') {
                    Some(end) if end > 0 && !rest[..end].contains(|c: char| c == ')' || c == '(' || c == '[') => {
                        (Some(FieldType::L(rest[..end].to_string())), &rest[end + 1..])
                    }
                    _ => (None, str),
                }
            }
            Some(b'[') => {
                match Self::parse_field_type(rest, true) {
                    (Some(component), rest) => (Some(FieldType::A(Box::new(component))), rest),
                    _ => (None, str)
                }
            }
            Some(b'V') if !is_parameter => (Some(FieldType::V), rest),
            _ => (None, str)
        }
    }

    pub fn parse(str: &str) -> Option<Self> {
        let mut str = str.strip_prefix('(')?;

        let mut parameters = vec![];
        loop {
            match Self::parse_field_type(str, true) {
                (Some(arg), rest) => {
                    parameters.push(arg);
                    str = rest;
                }
                _ => break,
            }
        }

        let str = str.strip_prefix(')')?;

        match Self::parse_field_type(str, false) {
            (Some(ret), rest) if rest.is_empty() => Some(MethodDescriptor {
                parameters,
                ret,
            }),
            _ => None
        }
    }
}

impl FieldType {
    /// Parses a complete field descriptor; trailing characters are rejected.
    pub fn parse(str: &str) -> Option<Self> {
        match MethodDescriptor::parse_field_type(str, true) {
            (Some(ty), rest) if rest.is_empty() => Some(ty),
            _ => None,
        }
    }

    /// The type of the elements of an array class named `name` (`[I`, `[[Lpkg/A;`).
    pub fn array_component(name: &str) -> Option<Self> {
        match FieldType::parse(name)? {
            FieldType::A(component) => Some(*component),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::vm::class::field::FieldType;
    use crate::vm::class::field::FieldType::*;
    use crate::vm::class::method::MethodDescriptor;

    #[test]
    fn parse_method_descriptor() {
        assert_eq!(MethodDescriptor::parse("()V"), Some(MethodDescriptor { parameters: vec![],
            ret: V }));

        assert_eq!(MethodDescriptor::parse("()[Ljava/lang/String;"), Some(MethodDescriptor { parameters: vec![],
            ret: A(Box::from(L(String::from("java/lang/String")))) }));

        assert_eq!(MethodDescriptor::parse("(IV)I"), None);
        assert_eq!(MethodDescriptor::parse("(I)I "), None);
        assert_eq!(MethodDescriptor::parse(""), None);
        assert_eq!(MethodDescriptor::parse("(L;)V"), None);
        assert_eq!(MethodDescriptor::parse("(IJ[[Ljava/lang/String;)I"),
                   Some(MethodDescriptor {
                       parameters: vec![I, J, A(Box::new(A(Box::new(L(
                           String::from("java/lang/String"))))))],
                       ret: I
                   }));
    }

    #[test]
    fn parse_field_descriptor() {
        assert_eq!(FieldType::parse("J"), Some(J));
        assert_eq!(FieldType::parse("JJ"), None);
        assert_eq!(FieldType::parse("V"), None);
        assert_eq!(FieldType::array_component("[[I"), Some(A(Box::new(I))));
        assert_eq!(FieldType::parse("[Lpkg/A;").unwrap().descriptor(), "[Lpkg/A;");
        assert_eq!(MethodDescriptor::parse("(JD[I)V").unwrap().arg_slots(), 5);
    }
}
