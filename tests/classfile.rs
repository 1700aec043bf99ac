use playout_agent::classfile::{class_name, ClassFileError, ClassHeader, CpEntry};

struct CpBuilder {
    entries: Vec<Vec<u8>>,
    slots: u16,
}

impl CpBuilder {
    fn new() -> Self {
        Self { entries: Vec::new(), slots: 0 }
    }

    fn push(&mut self, entry: Vec<u8>, width: u16) -> u16 {
        self.entries.push(entry);
        let index = self.slots + 1;
        self.slots += width;
        index
    }

    fn utf8(&mut self, s: &str) -> u16 {
        let mut entry = vec![1];
        entry.extend_from_slice(&(s.len() as u16).to_be_bytes());
        entry.extend_from_slice(s.as_bytes());
        self.push(entry, 1)
    }

    fn class(&mut self, name_index: u16) -> u16 {
        let mut entry = vec![7];
        entry.extend_from_slice(&name_index.to_be_bytes());
        self.push(entry, 1)
    }

    fn long(&mut self, value: i64) -> u16 {
        let mut entry = vec![5];
        entry.extend_from_slice(&value.to_be_bytes());
        self.push(entry, 2)
    }

    fn double(&mut self, value: f64) -> u16 {
        let mut entry = vec![6];
        entry.extend_from_slice(&value.to_bits().to_be_bytes());
        self.push(entry, 2)
    }

    fn method_handle(&mut self, kind: u8, reference_index: u16) -> u16 {
        let mut entry = vec![15, kind];
        entry.extend_from_slice(&reference_index.to_be_bytes());
        self.push(entry, 1)
    }

    fn package(&mut self, name_index: u16) -> u16 {
        let mut entry = vec![20];
        entry.extend_from_slice(&name_index.to_be_bytes());
        self.push(entry, 1)
    }

    /// Writes the class header with `this_class` and `super_class`.
    fn finish(self, this_class: u16, super_class: u16) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFEBABE_u32.to_be_bytes());
        out.extend_from_slice(&0_u16.to_be_bytes());
        out.extend_from_slice(&61_u16.to_be_bytes());
        out.extend_from_slice(&(self.slots + 1).to_be_bytes());
        for entry in &self.entries {
            out.extend_from_slice(entry);
        }
        out.extend_from_slice(&0x0021_u16.to_be_bytes());
        out.extend_from_slice(&this_class.to_be_bytes());
        out.extend_from_slice(&super_class.to_be_bytes());
        // interfaces, fields, methods, attributes
        for _ in 0..4 {
            out.extend_from_slice(&0_u16.to_be_bytes());
        }
        out
    }
}

fn plugin_class() -> Vec<u8> {
    let mut cp = CpBuilder::new();
    let wide = cp.long(-7);
    let name = cp.utf8("app/plugins/Plugin$Loader");
    let dbl = cp.double(2.5);
    let this_class = cp.class(name);
    let object = cp.utf8("java/lang/Object");
    let super_class = cp.class(object);
    let pkg = cp.utf8("app/plugins");
    cp.package(pkg);
    cp.method_handle(6, this_class);
    assert_eq!((wide, name, dbl, this_class), (1, 3, 4, 6));
    cp.finish(this_class, super_class)
}

#[test]
fn reads_name_past_two_slot_constants() {
    let bytes = plugin_class();
    let class = ClassHeader::parse(&bytes).unwrap();
    assert_eq!(class.major_version, 61);
    assert_eq!(class.access_flags, 0x0021);
    assert_eq!(class.name().unwrap(), "app/plugins/Plugin$Loader");
    assert_eq!(class.constant_pool.class_name(class.super_class).unwrap(), "java/lang/Object");
    assert_eq!(class.constant_pool.get(1).unwrap(), &CpEntry::Other(5));
    assert_eq!(class.constant_pool.get(10).unwrap(), &CpEntry::Other(20));
    assert_eq!(class.constant_pool.len(), 12);
    assert!(matches!(class.constant_pool.get(2), Err(ClassFileError::InvalidConstantPoolIndex(2))));
    assert_eq!(class_name(&bytes).unwrap(), "app/plugins/Plugin$Loader");
}

#[test]
fn rejects_bad_magic() {
    let mut bytes = plugin_class();
    bytes[0] = 0xDE;
    assert!(matches!(ClassHeader::parse(&bytes), Err(ClassFileError::InvalidMagic(_))));
}

#[test]
fn rejects_truncated_class() {
    let bytes = plugin_class();
    for len in [0, 3, 9, 20] {
        assert!(
            matches!(ClassHeader::parse(&bytes[..len]), Err(ClassFileError::UnexpectedEof)),
            "len {len}"
        );
    }
}

#[test]
fn rejects_unknown_tag() {
    let mut cp = CpBuilder::new();
    cp.push(vec![2, 0, 0], 1);
    let bytes = cp.finish(1, 1);
    assert!(matches!(ClassHeader::parse(&bytes), Err(ClassFileError::InvalidConstantPoolTag(2))));
}

#[test]
fn this_class_must_point_at_a_class() {
    let mut cp = CpBuilder::new();
    let name = cp.utf8("app/Main");
    let bytes = cp.finish(name, 0);
    assert!(class_name(&bytes).is_err());
}
