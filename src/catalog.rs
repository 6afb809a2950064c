use serde::{Deserialize, Serialize};

/// One entry of the flag catalog: a country name with its two-letter
/// lowercase ISO 3166-1 code, which is also the flag CDN's key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
    pub code: String,
}

impl Country {
    fn new(name: &str, code: &str) -> Self {
        Self {
            name: name.to_string(),
            code: code.to_string(),
        }
    }
}

/// The fixed country catalog, loaded once at startup and shared with the
/// handlers. Never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub countries: Vec<Country>,
}

impl Catalog {
    pub fn new() -> Self {
        let countries = COUNTRIES
            .iter()
            .map(|(name, code)| Country::new(name, code))
            .collect();
        return Self { countries };
    }

    /// Case-insensitive substring search over country names.
    /// An empty term matches the whole catalog.
    pub fn search(&self, term: &str) -> Vec<&Country> {
        let term = term.to_lowercase();
        self.countries
            .iter()
            .filter(|country| country.name.to_lowercase().contains(&term))
            .collect()
    }

    /// Exact (case-insensitive) lookup by country name.
    pub fn find(&self, name: &str) -> Option<&Country> {
        self.countries
            .iter()
            .find(|country| country.name.eq_ignore_ascii_case(name.trim()))
    }

    /// The ISO code for a country name, if the catalog knows it.
    pub fn code_for(&self, name: &str) -> Option<&str> {
        self.find(name).map(|country| country.code.as_str())
    }
}

/// Pixel sizes of the flag CDN images the bot requests.
#[derive(Debug, Clone, Copy)]
pub enum FlagSize {
    /// 640px wide, for the country detail view.
    Detail,
    /// 240px tall, for quiz questions.
    Quiz,
}

impl FlagSize {
    fn segment(&self) -> &'static str {
        match self {
            FlagSize::Detail => "w640",
            FlagSize::Quiz => "h240",
        }
    }
}

pub fn flag_url(code: &str, size: FlagSize) -> String {
    format!("https://flagcdn.com/{}/{}.png", size.segment(), code)
}

const COUNTRIES: &[(&str, &str)] = &[
    ("Afghanistan", "af"),
    ("Albania", "al"),
    ("Algeria", "dz"),
    ("Angola", "ao"),
    ("Argentina", "ar"),
    ("Armenia", "am"),
    ("Australia", "au"),
    ("Austria", "at"),
    ("Azerbaijan", "az"),
    ("Bangladesh", "bd"),
    ("Belarus", "by"),
    ("Belgium", "be"),
    ("Bolivia", "bo"),
    ("Bosnia and Herzegovina", "ba"),
    ("Botswana", "bw"),
    ("Brazil", "br"),
    ("Bulgaria", "bg"),
    ("Cambodia", "kh"),
    ("Cameroon", "cm"),
    ("Canada", "ca"),
    ("Chad", "td"),
    ("Chile", "cl"),
    ("China", "cn"),
    ("Colombia", "co"),
    ("Costa Rica", "cr"),
    ("Croatia", "hr"),
    ("Cuba", "cu"),
    ("Cyprus", "cy"),
    ("Czechia", "cz"),
    ("Denmark", "dk"),
    ("Dominican Republic", "do"),
    ("Ecuador", "ec"),
    ("Egypt", "eg"),
    ("El Salvador", "sv"),
    ("Estonia", "ee"),
    ("Ethiopia", "et"),
    ("Fiji", "fj"),
    ("Finland", "fi"),
    ("France", "fr"),
    ("Georgia", "ge"),
    ("Germany", "de"),
    ("Ghana", "gh"),
    ("Greece", "gr"),
    ("Guatemala", "gt"),
    ("Honduras", "hn"),
    ("Hungary", "hu"),
    ("Iceland", "is"),
    ("India", "in"),
    ("Indonesia", "id"),
    ("Iran", "ir"),
    ("Iraq", "iq"),
    ("Ireland", "ie"),
    ("Israel", "il"),
    ("Italy", "it"),
    ("Jamaica", "jm"),
    ("Japan", "jp"),
    ("Jordan", "jo"),
    ("Kazakhstan", "kz"),
    ("Kenya", "ke"),
    ("Kuwait", "kw"),
    ("Laos", "la"),
    ("Latvia", "lv"),
    ("Lebanon", "lb"),
    ("Libya", "ly"),
    ("Lithuania", "lt"),
    ("Luxembourg", "lu"),
    ("Madagascar", "mg"),
    ("Malaysia", "my"),
    ("Mali", "ml"),
    ("Malta", "mt"),
    ("Mexico", "mx"),
    ("Moldova", "md"),
    ("Monaco", "mc"),
    ("Mongolia", "mn"),
    ("Montenegro", "me"),
    ("Morocco", "ma"),
    ("Mozambique", "mz"),
    ("Myanmar", "mm"),
    ("Namibia", "na"),
    ("Nepal", "np"),
    ("Netherlands", "nl"),
    ("New Zealand", "nz"),
    ("Nicaragua", "ni"),
    ("Nigeria", "ng"),
    ("North Korea", "kp"),
    ("North Macedonia", "mk"),
    ("Norway", "no"),
    ("Oman", "om"),
    ("Pakistan", "pk"),
    ("Panama", "pa"),
    ("Papua New Guinea", "pg"),
    ("Paraguay", "py"),
    ("Peru", "pe"),
    ("Philippines", "ph"),
    ("Poland", "pl"),
    ("Portugal", "pt"),
    ("Qatar", "qa"),
    ("Romania", "ro"),
    ("Russia", "ru"),
    ("Rwanda", "rw"),
    ("Saudi Arabia", "sa"),
    ("Senegal", "sn"),
    ("Serbia", "rs"),
    ("Singapore", "sg"),
    ("Slovakia", "sk"),
    ("Slovenia", "si"),
    ("Somalia", "so"),
    ("South Africa", "za"),
    ("South Korea", "kr"),
    ("Spain", "es"),
    ("Sri Lanka", "lk"),
    ("Sudan", "sd"),
    ("Sweden", "se"),
    ("Switzerland", "ch"),
    ("Syria", "sy"),
    ("Taiwan", "tw"),
    ("Tanzania", "tz"),
    ("Thailand", "th"),
    ("Tunisia", "tn"),
    ("Turkey", "tr"),
    ("Uganda", "ug"),
    ("Ukraine", "ua"),
    ("United Arab Emirates", "ae"),
    ("United Kingdom", "gb"),
    ("United States", "us"),
    ("Uruguay", "uy"),
    ("Uzbekistan", "uz"),
    ("Venezuela", "ve"),
    ("Vietnam", "vn"),
    ("Yemen", "ye"),
    ("Zambia", "zm"),
    ("Zimbabwe", "zw"),
];
