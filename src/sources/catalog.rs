use indexmap::IndexMap;

use crate::model::VehicleType;

const CARS: &[(&str, &[&str])] = &[
    ("Chevrolet", &["Onix", "Tracker", "S10", "Spin"]),
    ("Fiat", &["Uno", "Argo", "Mobi", "Toro", "Strada"]),
    ("Volkswagen", &["Gol", "Polo", "T-Cross", "Amarok"]),
    ("Ford", &["Ka", "EcoSport", "Ranger"]),
    ("Toyota", &["Corolla", "Hilux", "Yaris", "SW4"]),
    ("Honda", &["Civic", "HR-V", "City", "Fit"]),
    ("Hyundai", &["HB20", "Creta", "Tucson"]),
    ("Renault", &["Kwid", "Sandero", "Duster"]),
    ("Jeep", &["Renegade", "Compass"]),
    ("Nissan", &["Kicks", "Versa", "Frontier"]),
    ("BMW", &["320i", "X1", "X5"]),
    ("Mercedes-Benz", &["C 200", "GLA 200"]),
    ("Porsche", &["Macan", "Cayenne", "911 Carrera"]),
];

const MOTORCYCLES: &[(&str, &[&str])] = &[
    ("Honda", &["CG 160 Fan", "Biz 125", "CB 500F", "XRE 300", "Gold Wing"]),
    ("Yamaha", &["Factor 150", "Fazer 250", "MT-07", "Lander 250"]),
    ("Suzuki", &["Intruder 125", "V-Strom 650", "GSX 1300R Hayabusa"]),
    ("Kawasaki", &["Ninja 400", "Z900", "Versys 650"]),
    ("BMW", &["G 310 R", "F 850 GS", "R 1250 GS"]),
    ("Ducati", &["Monster", "Scrambler", "Panigale V4"]),
    ("Harley-Davidson", &["Iron 883", "Fat Boy"]),
];

const TRUCKS: &[(&str, &[&str])] = &[
    ("Volvo", &["FH 540", "FM 370", "VM 270"]),
    ("Scania", &["R 540", "S 500", "P 320"]),
    ("Mercedes-Benz", &["Actros 2651", "Atego 2430", "Accelo 1016"]),
    ("Volkswagen", &["Constellation 24.280", "Delivery 11.180", "Meteor 29.520"]),
    ("Iveco", &["Tector 240E30", "Stralis 600S44T", "Daily 35-150"]),
    ("DAF", &["XF 480", "CF 410"]),
];

const TRACTORS: &[(&str, &[&str])] = &[
    ("John Deere", &["5078E", "6125J", "8R 410", "S790"]),
    ("Massey Ferguson", &["MF 4275", "MF 6713", "MF 8737"]),
    ("New Holland", &["TL5.80", "T7.245", "CR 8.90"]),
    ("Case IH", &["Farmall 80", "Puma 185", "Magnum 340"]),
    ("Valtra", &["A750", "BH194", "T250"]),
    ("Jacto", &["Uniport 3030", "Uniport 4530"]),
];

const BOATS: &[(&str, &[&str])] = &[
    ("Schaefer", &["Phantom 303", "Phantom 400", "V33"]),
    ("Azimut", &["Atlantis 45", "Azimut 60", "S6"]),
    ("Fibrafort", &["Focker 215", "Focker 242", "Focker 305"]),
    ("Ferretti", &["500", "670"]),
    ("Intermarine", &["42 Full", "55", "60 Offshore"]),
    ("Sea-Doo", &["Spark 90", "GTI 130", "RXP-X 300"]),
];

/// Hand-authored brand -> models catalog for one vehicle type. Insertion order
/// is kept so generated datasets are stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedCatalog {
    brands: IndexMap<String, Vec<String>>,
}

impl SeedCatalog {
    pub fn from_table(table: &[(&str, &[&str])]) -> Self {
        let mut catalog = Self::default();
        for (brand, models) in table {
            catalog.insert(brand, models.iter().copied());
        }
        catalog
    }

    /// Built-in catalog for a vehicle type.
    pub fn builtin(vehicle_type: VehicleType) -> Self {
        let table = match vehicle_type {
            VehicleType::Car => CARS,
            VehicleType::Motorcycle => MOTORCYCLES,
            VehicleType::Truck => TRUCKS,
            VehicleType::Tractor => TRACTORS,
            VehicleType::Boat => BOATS,
        };
        Self::from_table(table)
    }

    /// Add models under a brand; duplicates and blank names are ignored.
    pub fn insert<'a>(&mut self, brand: &str, models: impl IntoIterator<Item = &'a str>) {
        let brand = brand.trim();
        if brand.is_empty() {
            return;
        }
        let entry = self.brands.entry(brand.to_string()).or_default();
        for model in models {
            let model = model.trim();
            if !model.is_empty() && !entry.iter().any(|m| m == model) {
                entry.push(model.to_string());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.brands.iter().map(|(b, m)| (b.as_str(), m.as_slice()))
    }

    pub fn brand_count(&self) -> usize {
        self.brands.len()
    }

    /// Number of (brand, model) pairs.
    pub fn model_count(&self) -> usize {
        self.brands.values().map(Vec::len).sum()
    }
}
